//! Exact fetch, candidate scan, cache fallback.
//!
//! Each resolution walks three tiers in order and stops at the first
//! valid record:
//!
//! 1. the requested key, retried with backoff on transport failures
//! 2. ring candidates around the coordinate, closest first, one lookup each
//! 3. the offline cache, whatever key it holds
//!
//! Only a successful remote tier writes the cache. Permanent store errors
//! and cancellation end the resolution immediately.

use std::sync::Arc;

use chrono::Utc;
use gridcast_core::{ResolveError, ResolverConfig};
use tokio_util::sync::CancellationToken;

use crate::cache::OfflineCache;
use crate::grid::GridIndex;
use crate::key::GridKey;
use crate::quantize::CoordinateQuantizer;
use crate::retry::{with_retry, RetryDecision, RetryError, RetryPolicy};
use crate::rings::{Candidate, RingCandidateGenerator, SearchRing};
use crate::store::{DocumentStore, StoreError};
use crate::types::WeatherRecord;
use crate::validate::is_valid;

pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Budget for the requested key only; candidates get one lookup each
    pub retry: RetryPolicy,
    pub search_radius_km: f64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            search_radius_km: DEFAULT_SEARCH_RADIUS_KM,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            search_radius_km: config.search_radius_km,
        }
    }
}

/// Which tier produced the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolutionSource {
    Exact,
    Candidate {
        distance_km: f64,
    },
    Cache {
        /// The cached key is the one that was requested
        matches_request: bool,
        /// The local copy is older than the cache TTL
        expired: bool,
    },
}

/// A resolved weather record.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub requested: GridKey,
    /// Key the record was stored under. Unknown only for legacy snapshots.
    pub key: Option<GridKey>,
    pub record: WeatherRecord,
    pub source: ResolutionSource,
    /// The record's own generation time is past the staleness threshold
    pub stale: bool,
}

impl Resolution {
    pub fn is_from_cache(&self) -> bool {
        matches!(self.source, ResolutionSource::Cache { .. })
    }
}

pub struct ResilientFetcher {
    store: Arc<dyn DocumentStore>,
    index: Arc<GridIndex>,
    cache: Arc<OfflineCache>,
    quantizer: CoordinateQuantizer,
    rings: RingCandidateGenerator,
    options: FetchOptions,
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("points", &self.index.len())
            .field("quantizer", &self.quantizer)
            .field("rings", &self.rings)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ResilientFetcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<GridIndex>,
        cache: Arc<OfflineCache>,
        options: FetchOptions,
    ) -> Self {
        let quantizer = CoordinateQuantizer::new(index.config());

        Self {
            store,
            index,
            cache,
            quantizer,
            rings: RingCandidateGenerator::default(),
            options,
        }
    }

    /// Replace the default candidate rings.
    pub fn with_rings(mut self, rings: Vec<SearchRing>) -> Self {
        self.rings = RingCandidateGenerator::with_rings(rings);
        self
    }

    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    pub fn quantizer(&self) -> &CoordinateQuantizer {
        &self.quantizer
    }

    /// Resolve a canonical key. Candidates are searched around the key itself.
    pub async fn resolve(&self, key: GridKey) -> Result<Resolution, ResolveError> {
        self.resolve_with_cancel(key, &CancellationToken::new()).await
    }

    pub async fn resolve_with_cancel(
        &self,
        key: GridKey,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        self.run(key, key.latitude(), key.longitude(), cancel).await
    }

    /// Snap a raw coordinate onto the lattice and resolve it.
    pub async fn resolve_coordinate(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Resolution, ResolveError> {
        self.resolve_coordinate_with_cancel(latitude, longitude, &CancellationToken::new())
            .await
    }

    pub async fn resolve_coordinate_with_cancel(
        &self,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let key = self.quantizer.snapped_key(latitude, longitude);
        self.run(key, latitude, longitude, cancel).await
    }

    /// Resolve the closest indexed point, priority points included.
    pub async fn resolve_nearest(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Resolution, ResolveError> {
        self.resolve_nearest_with_cancel(latitude, longitude, &CancellationToken::new())
            .await
    }

    pub async fn resolve_nearest_with_cancel(
        &self,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        let key = match self.index.nearest(latitude, longitude) {
            Some(point) => point.key,
            None => {
                tracing::warn!("Grid index is empty, falling back to lattice snapping");
                self.quantizer.snapped_key(latitude, longitude)
            }
        };
        self.run(key, latitude, longitude, cancel).await
    }

    async fn run(
        &self,
        requested: GridKey,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        tracing::debug!(
            "Resolving {} for ({:.4}, {:.4})",
            requested,
            latitude,
            longitude
        );

        if let Some(record) = self.exact_fetch(&requested, cancel).await? {
            return Ok(self
                .finish(requested, requested, record, ResolutionSource::Exact)
                .await);
        }

        if let Some((candidate, record)) = self
            .candidate_scan(&requested, latitude, longitude, cancel)
            .await?
        {
            let source = ResolutionSource::Candidate {
                distance_km: candidate.distance_km,
            };
            return Ok(self.finish(requested, candidate.key, record, source).await);
        }

        self.cache_fallback(requested)
    }

    /// `Ok(None)` means "try the next tier".
    async fn exact_fetch(
        &self,
        key: &GridKey,
        cancel: &CancellationToken,
    ) -> Result<Option<WeatherRecord>, ResolveError> {
        let classify = |e: &StoreError| {
            if e.is_retryable() {
                RetryDecision::Retry
            } else {
                RetryDecision::NoRetry
            }
        };

        let result = with_retry(&self.options.retry, cancel, classify, |_| self.store.get(key)).await;

        match result {
            Ok(record) if is_valid(&record) => Ok(Some(record)),
            Ok(_) => {
                tracing::warn!("Record for {} failed validation", key);
                Ok(None)
            }
            Err(RetryError::Cancelled) => {
                tracing::info!("Resolution of {} cancelled", key);
                Err(ResolveError::Cancelled)
            }
            Err(RetryError::Failed(StoreError::Permanent(message))) => {
                tracing::error!("Store rejected {}: {}", key, message);
                Err(ResolveError::Permanent {
                    key: key.to_string(),
                    message,
                })
            }
            Err(RetryError::Failed(e)) => {
                tracing::warn!("Exact fetch for {} failed: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Sequential, closest first. The primary key was already tried.
    async fn candidate_scan(
        &self,
        primary: &GridKey,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Option<(Candidate, WeatherRecord)>, ResolveError> {
        let candidates = self
            .rings
            .candidates(latitude, longitude, self.options.search_radius_km);
        tracing::debug!(
            "Scanning {} candidates within {} km of {}",
            candidates.len(),
            self.options.search_radius_km,
            primary
        );

        for candidate in candidates.into_iter().filter(|c| c.key != *primary) {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Resolution of {} cancelled during candidate scan", primary);
                    return Err(ResolveError::Cancelled);
                }
                result = self.store.get(&candidate.key) => result,
            };

            match result {
                Ok(record) if is_valid(&record) => {
                    tracing::debug!(
                        "Candidate {} accepted at {:.1} km",
                        candidate.key,
                        candidate.distance_km
                    );
                    return Ok(Some((candidate, record)));
                }
                Ok(_) => tracing::debug!("Candidate {} failed validation", candidate.key),
                Err(StoreError::Permanent(message)) => {
                    tracing::error!("Store rejected candidate {}: {}", candidate.key, message);
                    return Err(ResolveError::Permanent {
                        key: primary.to_string(),
                        message,
                    });
                }
                Err(e) => tracing::debug!("Candidate {} unavailable: {}", candidate.key, e),
            }
        }

        Ok(None)
    }

    async fn finish(
        &self,
        requested: GridKey,
        key: GridKey,
        record: WeatherRecord,
        source: ResolutionSource,
    ) -> Resolution {
        if let Err(e) = self.cache.save(&key, &record).await {
            tracing::warn!("Failed to cache weather record for {}: {}", key, e);
        }

        let stale = record.is_stale_at(Utc::now(), self.cache.stale_after());
        if stale {
            tracing::warn!(
                "Weather record for {} is stale (generated {:?})",
                key,
                record.generated_at
            );
        }

        tracing::info!("Resolved {} from {} ({:?})", requested, key, source);

        Resolution {
            requested,
            key: Some(key),
            record,
            source,
            stale,
        }
    }

    fn cache_fallback(&self, requested: GridKey) -> Result<Resolution, ResolveError> {
        let Some(cached) = self.cache.load() else {
            tracing::error!("No weather data available for {}", requested);
            return Err(ResolveError::Exhausted {
                key: requested.to_string(),
            });
        };

        let now = Utc::now();
        let age = cached.age_at(now);
        let matches_request = cached.key == Some(requested);
        let expired = age > self.cache.ttl();
        let stale = cached.record.is_stale_at(now, self.cache.stale_after());

        tracing::warn!(
            "Serving cached weather record for {} (requested {}, {} min old)",
            cached
                .key
                .map_or_else(|| "unknown key".to_string(), |k| k.to_string()),
            requested,
            age.num_minutes()
        );

        Ok(Resolution {
            requested,
            key: cached.key,
            record: cached.record,
            source: ResolutionSource::Cache {
                matches_request,
                expired,
            },
            stale,
        })
    }
}
