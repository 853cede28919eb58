use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (also holds the cache snapshot)
    pub config_dir: PathBuf,

    /// Lattice definition and curated priority points
    #[serde(default)]
    pub grid: GridConfig,

    /// Remote store and fallback search settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Offline cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// A hand-curated coordinate added to the index on top of the lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityPoint {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PriorityPoint {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// Regular lattice bounds (degrees, inclusive) plus priority points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub lat_start: f64,
    pub lat_end: f64,
    pub lon_start: f64,
    pub lon_end: f64,
    pub step: f64,
    #[serde(default = "default_priority_points")]
    pub priority_points: Vec<PriorityPoint>,
}

fn default_priority_points() -> Vec<PriorityPoint> {
    vec![
        PriorityPoint::new("Aizawl", 23.73, 92.72),
        PriorityPoint::new("Lunglei", 22.88, 92.73),
        PriorityPoint::new("Champhai", 23.47, 93.33),
        PriorityPoint::new("Serchhip", 23.30, 92.85),
        PriorityPoint::new("Kolasib", 24.22, 92.68),
        PriorityPoint::new("Mamit", 23.93, 92.48),
        PriorityPoint::new("Lawngtlai", 22.53, 92.90),
        PriorityPoint::new("Saiha", 22.49, 92.97),
        PriorityPoint::new("Khawzawl", 23.53, 93.18),
        PriorityPoint::new("Hnahthial", 22.97, 92.93),
        PriorityPoint::new("Saitual", 23.97, 92.58),
    ]
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lat_start: 21.90,
            lat_end: 24.60,
            lon_start: 92.20,
            lon_end: 93.50,
            step: 0.10,
            priority_points: default_priority_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the remote document store
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Collection the weather documents live in
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts for the primary key (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` waits `n` units before running
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Candidate scan radius around the requested coordinate
    #[serde(default = "default_search_radius_km")]
    pub search_radius_km: f64,
}

fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_collection() -> String {
    "weather".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_search_radius_km() -> f64 {
    50.0
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            collection: default_collection(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            search_radius_km: default_search_radius_km(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached copy is trusted as a primary source (default: 30)
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u32,

    /// Age of the record's own generation time that counts as stale (default: 12)
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u32,

    /// Snapshot file name inside the config directory
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

fn default_ttl_minutes() -> u32 {
    30
}

fn default_stale_after_hours() -> u32 {
    12
}

fn default_snapshot_file() -> String {
    "weather_cache.json".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            stale_after_hours: default_stale_after_hours(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridcast");

        Self {
            config_dir,
            grid: GridConfig::default(),
            resolver: ResolverConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file
    ///
    /// Failures carry a [`ConfigError`] that callers can downcast to.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Invalid(format!("{}: {}", path.display(), e)),
        })?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_grid(&mut result);

        let store_url = &self.resolver.store_url;
        self.validate_url(store_url, "resolver.store_url", &mut result);

        if self.resolver.collection.trim().is_empty() {
            result.add_error("resolver.collection", "Collection name must not be empty");
        }

        if self.resolver.max_attempts == 0 {
            result.add_error("resolver.max_attempts", "At least one attempt is required");
        } else if self.resolver.max_attempts > 10 {
            result.add_warning(
                "resolver.max_attempts",
                "More than 10 attempts will delay fallback noticeably",
            );
        }

        if self.resolver.request_timeout_secs == 0 {
            result.add_error(
                "resolver.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        let radius = self.resolver.search_radius_km;
        if !radius.is_finite() || radius <= 0.0 {
            result.add_error(
                "resolver.search_radius_km",
                "Search radius must be a positive number",
            );
        }

        if self.cache.ttl_minutes == 0 {
            result.add_warning("cache.ttl_minutes", "Cached data will always be treated as expired");
        }

        if self.cache.snapshot_file.trim().is_empty() {
            result.add_error("cache.snapshot_file", "Snapshot file name must not be empty");
        }

        result
    }

    fn validate_grid(&self, result: &mut ValidationResult) {
        let grid = &self.grid;

        if !grid.step.is_finite() || grid.step <= 0.0 {
            result.add_error("grid.step", "Step must be greater than 0");
        } else if (grid.step * 100.0).round() < 1.0 {
            result.add_error("grid.step", "Step must be at least 0.01 degrees");
        }

        if grid.lat_start > grid.lat_end {
            result.add_error("grid.lat_start", "lat_start must not exceed lat_end");
        }
        if grid.lon_start > grid.lon_end {
            result.add_error("grid.lon_start", "lon_start must not exceed lon_end");
        }

        for (field, value) in [("grid.lat_start", grid.lat_start), ("grid.lat_end", grid.lat_end)] {
            if !(-90.0..=90.0).contains(&value) {
                result.add_error(field, format!("Latitude {} out of range [-90, 90]", value));
            }
        }
        for (field, value) in [("grid.lon_start", grid.lon_start), ("grid.lon_end", grid.lon_end)] {
            if !(-180.0..=180.0).contains(&value) {
                result.add_error(field, format!("Longitude {} out of range [-180, 180]", value));
            }
        }

        for (i, point) in grid.priority_points.iter().enumerate() {
            if !(-90.0..=90.0).contains(&point.latitude)
                || !(-180.0..=180.0).contains(&point.longitude)
            {
                result.add_error(
                    format!("grid.priority_points[{}]", i),
                    format!(
                        "Coordinate {}, {} is outside the valid range",
                        point.latitude, point.longitude
                    ),
                );
            }
        }

        if grid.priority_points.is_empty() {
            result.add_warning(
                "grid.priority_points",
                "No priority points - only the regular lattice will be indexed",
            );
        }
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the offline cache snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.config_dir.join(&self.cache.snapshot_file)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("gridcast");

        Ok(config_dir.join("config.toml"))
    }
}
