use std::sync::Arc;

use anyhow::{Context, Result};
use gridcast_core::{AppError, Config, ConfigError};
use gridcast_engine::{
    FetchOptions, FileSnapshotStore, GridIndex, HttpDocumentStore, OfflineCache, ResilientFetcher,
    ResolutionSource,
};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: gridcast <latitude> <longitude> [--nearest]";

#[derive(Debug, PartialEq)]
struct Args {
    latitude: f64,
    longitude: f64,
    nearest: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Resolve(Args),
}

fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut positional = Vec::new();
    let mut nearest = false;

    for arg in args {
        match arg.as_str() {
            "--nearest" => nearest = true,
            "-h" | "--help" => return Ok(Command::Help),
            _ => positional.push(arg),
        }
    }

    let [lat, lon] = positional.as_slice() else {
        anyhow::bail!("{}", USAGE);
    };

    Ok(Command::Resolve(Args {
        latitude: lat
            .parse()
            .with_context(|| format!("Invalid latitude: {}", lat))?,
        longitude: lon
            .parse()
            .with_context(|| format!("Invalid longitude: {}", lon))?,
        nearest,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    gridcast_core::init()?;

    let args = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::Resolve(args) => args,
    };

    let (config, _) = match Config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => match e.downcast::<ConfigError>() {
            Ok(config_err) => {
                tracing::error!("{}", config_err);
                anyhow::bail!("{}", config_err.user_message());
            }
            Err(e) => return Err(e),
        },
    };

    // Built once, shared for the life of the process
    let index = Arc::new(GridIndex::build(&config.grid));
    tracing::debug!("Grid index holds {} points", index.len());

    let snapshot = FileSnapshotStore::open(config.snapshot_path()).map_err(AppError::from)?;
    let cache = Arc::new(OfflineCache::new(snapshot, &config.cache));
    let store = HttpDocumentStore::from_config(&config.resolver)?;

    let fetcher = ResilientFetcher::new(
        Arc::new(store),
        index,
        cache,
        FetchOptions::from_config(&config.resolver),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    let result = if args.nearest {
        fetcher
            .resolve_nearest_with_cancel(args.latitude, args.longitude, &cancel)
            .await
    } else {
        fetcher
            .resolve_coordinate_with_cancel(args.latitude, args.longitude, &cancel)
            .await
    };

    let resolution = match result {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::error!("Resolution failed: {}", e);
            let err = AppError::from(e);
            anyhow::bail!("{}", err.user_message());
        }
    };

    if let ResolutionSource::Cache { expired, .. } = resolution.source {
        tracing::warn!(
            "Showing offline data{}",
            if expired { " (older than the cache TTL)" } else { "" }
        );
    }
    if resolution.stale {
        tracing::warn!("Weather data has not been refreshed upstream recently");
    }

    println!("{}", serde_json::to_string_pretty(&resolution.record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_help_returns_command_instead_of_exiting() {
        assert_eq!(parse_args(args(&["--help"])).unwrap(), Command::Help);
        assert_eq!(parse_args(args(&["23.7", "-h"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_parses_coordinate_and_nearest_flag() {
        let command = parse_args(args(&["23.7", "92.8", "--nearest"])).unwrap();
        assert_eq!(
            command,
            Command::Resolve(Args {
                latitude: 23.7,
                longitude: 92.8,
                nearest: true,
            })
        );
    }

    #[test]
    fn test_missing_longitude_reports_usage() {
        let err = parse_args(args(&["23.7"])).unwrap_err();
        assert_eq!(err.to_string(), USAGE);
    }

    #[test]
    fn test_unparseable_latitude_is_error() {
        let err = parse_args(args(&["north", "92.8"])).unwrap_err();
        assert!(err.to_string().contains("Invalid latitude"));
    }
}
