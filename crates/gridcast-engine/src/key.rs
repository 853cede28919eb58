//! Canonical record keys.
//!
//! A key is the coordinate rounded to hundredths of a degree and rendered as
//! `"{lat:.2}_{lon:.2}"`. The remote store names its documents this way, so
//! the text form must be reproduced exactly. Keys are held as integer
//! centi-degrees; formatting never goes through float printing and never
//! depends on the host locale.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Convert degrees to the nearest whole centi-degree.
pub(crate) fn to_centi(degrees: f64) -> i64 {
    (degrees * 100.0).round() as i64
}

pub(crate) fn from_centi(centi: i64) -> f64 {
    centi as f64 / 100.0
}

/// Errors produced when parsing a key string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("Key must have the form LAT_LON: {0}")]
    MissingSeparator(String),
    #[error("Key component is not a number: {0}")]
    InvalidNumber(String),
    #[error("Key is not in canonical two-decimal form: {0}")]
    NonCanonical(String),
}

/// Canonical two-decimal coordinate key, e.g. `23.70_92.80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey {
    lat_centi: i64,
    lon_centi: i64,
}

impl GridKey {
    pub fn from_centi(lat_centi: i64, lon_centi: i64) -> Self {
        Self {
            lat_centi,
            lon_centi,
        }
    }

    /// Round a coordinate to two decimals and key it.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self::from_centi(to_centi(latitude), to_centi(longitude))
    }

    pub fn latitude(&self) -> f64 {
        from_centi(self.lat_centi)
    }

    pub fn longitude(&self) -> f64 {
        from_centi(self.lon_centi)
    }

    pub fn lat_centi(&self) -> i64 {
        self.lat_centi
    }

    pub fn lon_centi(&self) -> i64 {
        self.lon_centi
    }

    /// True when the coordinate lies within [-90, 90] x [-180, 180].
    pub fn is_on_globe(&self) -> bool {
        (-9000..=9000).contains(&self.lat_centi) && (-18000..=18000).contains(&self.lon_centi)
    }
}

fn write_centi(f: &mut fmt::Formatter<'_>, centi: i64) -> fmt::Result {
    let sign = if centi < 0 { "-" } else { "" };
    let magnitude = centi.unsigned_abs();
    write!(f, "{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_centi(f, self.lat_centi)?;
        f.write_str("_")?;
        write_centi(f, self.lon_centi)
    }
}

impl FromStr for GridKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once('_')
            .ok_or_else(|| KeyParseError::MissingSeparator(s.to_string()))?;

        let lat: f64 = lat
            .parse()
            .map_err(|_| KeyParseError::InvalidNumber(s.to_string()))?;
        let lon: f64 = lon
            .parse()
            .map_err(|_| KeyParseError::InvalidNumber(s.to_string()))?;

        if !lat.is_finite() || !lon.is_finite() {
            return Err(KeyParseError::InvalidNumber(s.to_string()));
        }

        let key = GridKey::from_degrees(lat, lon);
        if key.to_string() != s {
            return Err(KeyParseError::NonCanonical(s.to_string()));
        }
        Ok(key)
    }
}

impl Serialize for GridKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GridKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
