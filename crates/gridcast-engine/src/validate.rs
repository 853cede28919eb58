//! Acceptance contract for fetched records.
//!
//! Shared by the exact fetch and the candidate scan. A record passes when
//! its coordinate is on the globe and at least one weather block carries a
//! plausible temperature. The current and the older series-only shapes both
//! qualify; each exposes its reading through [`CurrentReading`].

use crate::types::{CurrentConditions, DailySeries, HourlySeries, RecordPayload, WeatherRecord};

/// Exclusive bounds for a believable surface temperature in °C.
pub const MIN_PLAUSIBLE_TEMPERATURE: f64 = -100.0;
pub const MAX_PLAUSIBLE_TEMPERATURE: f64 = 100.0;

pub fn is_plausible_temperature(value: f64) -> bool {
    value.is_finite() && value > MIN_PLAUSIBLE_TEMPERATURE && value < MAX_PLAUSIBLE_TEMPERATURE
}

/// Something that can produce a "right now" temperature.
pub trait CurrentReading {
    fn current_temperature(&self) -> Option<f64>;
}

impl CurrentReading for CurrentConditions {
    fn current_temperature(&self) -> Option<f64> {
        self.temperature
    }
}

/// First entry of the first non-empty series, null entries included.
fn first_of(series: &[&[Option<f64>]]) -> Option<f64> {
    series
        .iter()
        .find(|values| !values.is_empty())
        .and_then(|values| values[0])
}

impl CurrentReading for HourlySeries {
    fn current_temperature(&self) -> Option<f64> {
        first_of(&[self.temperature.as_slice()])
    }
}

impl CurrentReading for DailySeries {
    fn current_temperature(&self) -> Option<f64> {
        first_of(&[
            self.temperature_max.as_slice(),
            self.temperature_min.as_slice(),
        ])
    }
}

impl CurrentReading for RecordPayload {
    fn current_temperature(&self) -> Option<f64> {
        let plausible = |t: &f64| is_plausible_temperature(*t);

        self.current()
            .and_then(|current| current.current_temperature())
            .filter(plausible)
            .or_else(|| {
                self.hourly()
                    .and_then(|hourly| hourly.current_temperature())
                    .filter(plausible)
            })
            .or_else(|| {
                self.daily()
                    .and_then(|daily| daily.current_temperature())
                    .filter(plausible)
            })
    }
}

impl CurrentReading for WeatherRecord {
    fn current_temperature(&self) -> Option<f64> {
        self.payload.current_temperature()
    }
}

fn has_valid_coordinate(record: &WeatherRecord) -> bool {
    (-90.0..=90.0).contains(&record.latitude) && (-180.0..=180.0).contains(&record.longitude)
}

/// Whether a fetched record may be handed to a caller or cached.
pub fn is_valid(record: &WeatherRecord) -> bool {
    has_valid_coordinate(record) && record.current_temperature().is_some()
}
