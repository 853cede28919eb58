//! Single-slot offline cache.
//!
//! Holds the last successfully resolved record plus its key and fetch time.
//! The slot lives behind a mutex and is written through to a
//! [`SnapshotStore`] so it survives restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gridcast_core::{CacheConfig, CacheError};
use parking_lot::Mutex;

use crate::key::GridKey;
use crate::types::{CachedRecord, WeatherRecord};

/// Snapshot field holding the record JSON.
pub const FIELD_RECORD: &str = "last_record_json";
/// Snapshot field holding the canonical key.
pub const FIELD_GRID_KEY: &str = "last_grid_key";
/// Snapshot field holding the fetch time in epoch milliseconds.
pub const FIELD_FETCHED_AT: &str = "last_fetch_timestamp";

/// Local string blob store the cache persists into.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, field: &str) -> Result<Option<String>, CacheError>;

    fn put(&self, field: &str, value: &str) -> Result<(), CacheError>;

    fn remove(&self, field: &str) -> Result<(), CacheError>;

    /// Write several fields. Implementations that can should make this atomic.
    fn put_many(&self, entries: &[(&str, &str)]) -> Result<(), CacheError> {
        for (field, value) in entries {
            self.put(field, value)?;
        }
        Ok(())
    }
}

/// In-process snapshot store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    fields: Mutex<BTreeMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self.fields.lock().get(field).cloned())
    }

    fn put(&self, field: &str, value: &str) -> Result<(), CacheError> {
        self.fields.lock().insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, field: &str) -> Result<(), CacheError> {
        self.fields.lock().remove(field);
        Ok(())
    }
}

/// Snapshot kept as one JSON object on disk.
///
/// Every write replaces the file through a temp file and a rename.
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    fields: Mutex<BTreeMap<String, String>>,
}

impl FileSnapshotStore {
    /// Open (or lazily create) the snapshot at `path`.
    ///
    /// A corrupt file is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let fields: BTreeMap<String, String> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable cache snapshot {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            fields: Mutex::new(fields),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, fields: &BTreeMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string(fields)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, field: &str) -> Result<Option<String>, CacheError> {
        Ok(self.fields.lock().get(field).cloned())
    }

    fn put(&self, field: &str, value: &str) -> Result<(), CacheError> {
        self.put_many(&[(field, value)])
    }

    fn remove(&self, field: &str) -> Result<(), CacheError> {
        let mut fields = self.fields.lock();
        if fields.remove(field).is_some() {
            self.persist(&fields)?;
        }
        Ok(())
    }

    fn put_many(&self, entries: &[(&str, &str)]) -> Result<(), CacheError> {
        let mut fields = self.fields.lock();
        for (field, value) in entries {
            fields.insert(field.to_string(), value.to_string());
        }
        self.persist(&fields)
    }
}

/// Last-write-wins cache of one resolved record.
pub struct OfflineCache {
    store: Arc<dyn SnapshotStore>,
    slot: Mutex<Option<CachedRecord>>,
    /// Orders snapshot writes so the file always matches the latest slot
    write_lock: tokio::sync::Mutex<()>,
    ttl: Duration,
    stale_after: Duration,
}

impl std::fmt::Debug for OfflineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCache")
            .field("slot", &self.slot)
            .field("ttl", &self.ttl)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl OfflineCache {
    pub fn new(store: impl SnapshotStore + 'static, config: &CacheConfig) -> Self {
        Self::with_limits(
            store,
            Duration::minutes(i64::from(config.ttl_minutes)),
            Duration::hours(i64::from(config.stale_after_hours)),
        )
    }

    /// Build with explicit limits, loading any persisted snapshot.
    pub fn with_limits(store: impl SnapshotStore + 'static, ttl: Duration, stale_after: Duration) -> Self {
        let slot = hydrate(&store);
        if let Some(cached) = &slot {
            tracing::debug!(
                "Loaded cached weather record (key {:?}, fetched {})",
                cached.key.map(|k| k.to_string()),
                cached.fetched_at()
            );
        }

        Self {
            store: Arc::new(store),
            slot: Mutex::new(slot),
            write_lock: tokio::sync::Mutex::new(()),
            ttl,
            stale_after,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Store `record` as fetched now.
    pub async fn save(&self, key: &GridKey, record: &WeatherRecord) -> Result<(), CacheError> {
        self.save_at(key, record, Utc::now()).await
    }

    /// Store `record` with an explicit fetch time.
    ///
    /// The in-memory slot is updated even if persisting fails. The snapshot
    /// write runs on the blocking pool.
    pub async fn save_at(
        &self,
        key: &GridKey,
        record: &WeatherRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let cached = CachedRecord {
            key: Some(*key),
            fetched_at_epoch_ms: fetched_at.timestamp_millis(),
            record: record.clone(),
        };

        let record_json = serde_json::to_string(&cached.record)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let entries = [
            (FIELD_RECORD, record_json),
            (FIELD_GRID_KEY, key.to_string()),
            (FIELD_FETCHED_AT, cached.fetched_at_epoch_ms.to_string()),
        ];

        let _write = self.write_lock.lock().await;
        *self.slot.lock() = Some(cached);

        self.run_blocking(move |store| {
            let fields: Vec<(&str, &str)> = entries
                .iter()
                .map(|(field, value)| (*field, value.as_str()))
                .collect();
            store.put_many(&fields)
        })
        .await
    }

    pub fn load(&self) -> Option<CachedRecord> {
        self.slot.lock().clone()
    }

    /// Drop the cached record, in memory and on disk.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _write = self.write_lock.lock().await;
        *self.slot.lock() = None;

        self.run_blocking(|store| {
            for field in [FIELD_RECORD, FIELD_GRID_KEY, FIELD_FETCHED_AT] {
                store.remove(field)?;
            }
            Ok(())
        })
        .await
    }

    async fn run_blocking<F>(&self, op: F) -> Result<(), CacheError>
    where
        F: FnOnce(&dyn SnapshotStore) -> Result<(), CacheError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| CacheError::Storage(format!("Snapshot write task failed: {}", e)))?
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.slot.lock().as_ref().map(|c| c.age_at(now))
    }

    /// The local copy is older than the TTL. An empty cache counts as expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now).map_or(true, |age| age > self.ttl)
    }

    /// The cached record's own generation time is past the staleness
    /// threshold. An empty cache is not stale.
    pub fn is_data_stale(&self) -> bool {
        self.is_data_stale_at(Utc::now())
    }

    pub fn is_data_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|c| c.record.is_stale_at(now, self.stale_after))
    }
}

fn hydrate(store: &dyn SnapshotStore) -> Option<CachedRecord> {
    let record_json = match store.get(FIELD_RECORD) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to read cached weather record: {}", e);
            return None;
        }
    };

    let record: WeatherRecord = match serde_json::from_str(&record_json) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Discarding unreadable cached weather record: {}", e);
            return None;
        }
    };

    let key = store
        .get(FIELD_GRID_KEY)
        .ok()
        .flatten()
        .and_then(|text| match text.parse::<GridKey>() {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("Ignoring cached grid key: {}", e);
                None
            }
        });

    let fetched_at_epoch_ms = store
        .get(FIELD_FETCHED_AT)
        .ok()
        .flatten()
        .and_then(|text| text.parse::<i64>().ok())
        .unwrap_or(0);

    Some(CachedRecord {
        key,
        fetched_at_epoch_ms,
        record,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    fn record(generated_at: DateTime<Utc>) -> WeatherRecord {
        serde_json::from_value(json!({
            "latitude": 23.7,
            "longitude": 92.8,
            "generated_at": generated_at,
            "current": { "temperature": 24.0 }
        }))
        .unwrap()
    }

    fn cache() -> OfflineCache {
        OfflineCache::new(MemorySnapshotStore::new(), &CacheConfig::default())
    }

    #[test]
    fn test_empty_cache() {
        let cache = cache();
        assert!(cache.load().is_none());
        assert!(cache.is_expired());
        assert!(!cache.is_data_stale());
        assert!(cache.age_at(Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let cache = cache();
        let key: GridKey = "23.70_92.80".parse().unwrap();
        let rec = record(Utc::now());

        cache.save(&key, &rec).await.unwrap();
        let cached = cache.load().unwrap();
        assert_eq!(cached.key, Some(key));
        assert_eq!(cached.record, rec);
        assert!(!cache.is_expired());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = cache();
        let first: GridKey = "23.70_92.80".parse().unwrap();
        let second: GridKey = "22.88_92.73".parse().unwrap();

        cache.save(&first, &record(Utc::now())).await.unwrap();
        cache.save(&second, &record(Utc::now())).await.unwrap();
        assert_eq!(cache.load().unwrap().key, Some(second));
    }

    #[tokio::test]
    async fn test_expiry_uses_fetch_time() {
        let cache = cache();
        let now = Utc::now();
        let key: GridKey = "23.70_92.80".parse().unwrap();

        cache.save_at(&key, &record(now), now - Duration::minutes(10)).await.unwrap();
        assert!(!cache.is_expired_at(now));

        cache.save_at(&key, &record(now), now - Duration::minutes(31)).await.unwrap();
        assert!(cache.is_expired_at(now));
    }

    #[tokio::test]
    async fn test_staleness_uses_generation_time() {
        let cache = cache();
        let now = Utc::now();
        let key: GridKey = "23.70_92.80".parse().unwrap();

        // Freshly fetched but generated 13 hours ago
        cache.save_at(&key, &record(now - Duration::hours(13)), now).await.unwrap();
        assert!(!cache.is_expired_at(now));
        assert!(cache.is_data_stale_at(now));

        // Fetched long ago but generated recently
        cache
            .save_at(&key, &record(now - Duration::hours(1)), now - Duration::hours(2))
            .await
            .unwrap();
        assert!(cache.is_expired_at(now));
        assert!(!cache.is_data_stale_at(now));
    }

    #[tokio::test]
    async fn test_snapshot_fields_written() {
        let store = std::sync::Arc::new(MemorySnapshotStore::new());
        let cache = OfflineCache::new(SharedStore(store.clone()), &CacheConfig::default());
        let key: GridKey = "23.70_92.80".parse().unwrap();
        let fetched_at = DateTime::from_timestamp_millis(1_760_000_000_000).unwrap();

        cache.save_at(&key, &record(fetched_at), fetched_at).await.unwrap();

        assert_eq!(store.get(FIELD_GRID_KEY).unwrap().as_deref(), Some("23.70_92.80"));
        assert_eq!(
            store.get(FIELD_FETCHED_AT).unwrap().as_deref(),
            Some("1760000000000")
        );
        assert!(store.get(FIELD_RECORD).unwrap().unwrap().contains("\"current\""));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache();
        let key: GridKey = "23.70_92.80".parse().unwrap();
        cache.save(&key, &record(Utc::now())).await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.load().is_none());
        assert!(cache.is_expired());
    }

    #[tokio::test]
    async fn test_snapshot_write_runs_off_the_calling_thread() {
        let store = ThreadRecordingStore::default();
        let writers = store.writers.clone();
        let cache = OfflineCache::new(store, &CacheConfig::default());
        let key: GridKey = "23.70_92.80".parse().unwrap();

        cache.save(&key, &record(Utc::now())).await.unwrap();

        let writers = writers.lock();
        assert_eq!(writers.len(), 1);
        assert_ne!(writers[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn test_survives_restart_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_cache.json");
        let key: GridKey = "22.88_92.73".parse().unwrap();
        let rec = record(Utc::now());

        {
            let cache = OfflineCache::new(FileSnapshotStore::open(&path).unwrap(), &CacheConfig::default());
            cache.save(&key, &rec).await.unwrap();
        }

        let reopened = OfflineCache::new(FileSnapshotStore::open(&path).unwrap(), &CacheConfig::default());
        let cached = reopened.load().unwrap();
        assert_eq!(cached.key, Some(key));
        assert_eq!(cached.record, rec);
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = OfflineCache::new(FileSnapshotStore::open(&path).unwrap(), &CacheConfig::default());
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_snapshot_without_key_still_loads() {
        let store = MemorySnapshotStore::new();
        store
            .put(FIELD_RECORD, &serde_json::to_string(&record(Utc::now())).unwrap())
            .unwrap();

        let cache = OfflineCache::new(store, &CacheConfig::default());
        let cached = cache.load().unwrap();
        assert_eq!(cached.key, None);
        assert!(cache.is_expired());
    }

    /// Remembers which thread performed each write.
    #[derive(Default)]
    struct ThreadRecordingStore {
        inner: MemorySnapshotStore,
        writers: std::sync::Arc<Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl SnapshotStore for ThreadRecordingStore {
        fn get(&self, field: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(field)
        }

        fn put(&self, field: &str, value: &str) -> Result<(), CacheError> {
            self.inner.put(field, value)
        }

        fn remove(&self, field: &str) -> Result<(), CacheError> {
            self.inner.remove(field)
        }

        fn put_many(&self, entries: &[(&str, &str)]) -> Result<(), CacheError> {
            self.writers.lock().push(std::thread::current().id());
            for (field, value) in entries {
                self.inner.put(field, value)?;
            }
            Ok(())
        }
    }

    /// Lets a test keep a handle on the store the cache writes into.
    struct SharedStore(std::sync::Arc<MemorySnapshotStore>);

    impl SnapshotStore for SharedStore {
        fn get(&self, field: &str) -> Result<Option<String>, CacheError> {
            self.0.get(field)
        }

        fn put(&self, field: &str, value: &str) -> Result<(), CacheError> {
            self.0.put(field, value)
        }

        fn remove(&self, field: &str) -> Result<(), CacheError> {
            self.0.remove(field)
        }
    }
}
