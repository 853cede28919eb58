pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, ConfigValidationError, GridConfig, PriorityPoint, ResolverConfig,
    ValidationResult,
};
pub use error::{AppError, CacheError, ConfigError, ResolveError};

use anyhow::Result;

/// Initialize logging for Gridcast binaries
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Gridcast core initialized");
    Ok(())
}
