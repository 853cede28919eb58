//! Centralized error types for Gridcast.
//!
//! Every error here carries a `user_message()` that is safe to show as-is;
//! the `Display` output keeps the technical detail for logs.

use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Resolve(e) => e.user_message(),
            AppError::Cache(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration file not found. Check the path.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Errors that cross the resolver boundary.
///
/// Retries and fallbacks are settled inside the fetcher, so only these
/// outcomes ever reach a caller.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every tier failed and no cached record exists.
    #[error("No weather data available for {key}")]
    Exhausted { key: String },

    /// The remote store rejected the request itself; retrying cannot help.
    #[error("Request for {key} rejected: {message}")]
    Permanent { key: String, message: String },

    #[error("Resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ResolveError::Exhausted { .. } => {
                "Weather data is unavailable for this location. Check your connection and try again."
            }
            ResolveError::Permanent { .. } => "The weather service rejected the request.",
            ResolveError::Cancelled => "The weather refresh was cancelled.",
        }
    }

    /// Key the caller originally asked for, when known.
    pub fn requested_key(&self) -> Option<&str> {
        match self {
            ResolveError::Exhausted { key } | ResolveError::Permanent { key, .. } => {
                Some(key.as_str())
            }
            ResolveError::Cancelled => None,
        }
    }
}

/// Offline cache persistence errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Snapshot storage failed: {0}")]
    Storage(String),

    #[error("Snapshot encoding failed: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CacheError::Storage(_) => "Offline data could not be saved.",
            CacheError::Serialization(_) => "Offline data may be outdated.",
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Storage(e.to_string())
    }
}
