use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::key::GridKey;

/// "Current conditions" block of the newer document shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(default, alias = "temperature_2m", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "apparent_temperature", skip_serializing_if = "Option::is_none")]
    pub feels_like: Option<f64>,
    #[serde(default, alias = "relative_humidity_2m", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, alias = "wind_speed_10m", skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Hourly time series. Entries may be null in the upstream payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default, alias = "temperature_2m")]
    pub temperature: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
}

/// Daily time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default, alias = "temperature_2m_max")]
    pub temperature_max: Vec<Option<f64>>,
    #[serde(default, alias = "temperature_2m_min")]
    pub temperature_min: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
}

/// The two document shapes the store has carried over time.
///
/// Documents with a `current` block decode as [`RecordPayload::Current`];
/// everything else is treated as the older series-only shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordPayload {
    Current {
        current: CurrentConditions,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hourly: Option<HourlySeries>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        daily: Option<DailySeries>,
    },
    Series {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hourly: Option<HourlySeries>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        daily: Option<DailySeries>,
    },
}

impl RecordPayload {
    pub fn current(&self) -> Option<&CurrentConditions> {
        match self {
            Self::Current { current, .. } => Some(current),
            Self::Series { .. } => None,
        }
    }

    pub fn hourly(&self) -> Option<&HourlySeries> {
        match self {
            Self::Current { hourly, .. } | Self::Series { hourly, .. } => hourly.as_ref(),
        }
    }

    pub fn daily(&self) -> Option<&DailySeries> {
        match self {
            Self::Current { daily, .. } | Self::Series { daily, .. } => daily.as_ref(),
        }
    }
}

/// A weather document as stored remotely. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub latitude: f64,
    pub longitude: f64,
    /// When the ingestion pipeline produced this document
    #[serde(default, alias = "generatedAt", skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: RecordPayload,
}

impl WeatherRecord {
    /// True when the record's own generation time is older than `threshold`.
    ///
    /// A record without a generation time is reported as stale.
    pub fn is_stale_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.generated_at {
            Some(generated_at) => now.signed_duration_since(generated_at) > threshold,
            None => true,
        }
    }
}

/// The single record kept for offline use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub key: Option<GridKey>,
    pub fetched_at_epoch_ms: i64,
    pub record: WeatherRecord,
}

impl CachedRecord {
    pub fn fetched_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.fetched_at_epoch_ms).unwrap_or_default()
    }

    /// Time since the local copy was written.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.fetched_at())
    }
}
