//! Snapping raw coordinates onto the regular lattice.
//!
//! All arithmetic runs on integer centi-degrees so that values such as
//! `23.7` (which has no exact binary representation) land on the same
//! lattice line every time.

use gridcast_core::GridConfig;

use crate::key::{from_centi, to_centi, GridKey};

/// Inputs are bounded to one full turn before conversion so the
/// centi-degree arithmetic stays far from `i64` limits. NaN maps to 0.
const MAX_ABS_DEGREES: f64 = 360.0;

fn bounded_centi(degrees: f64) -> i64 {
    to_centi(degrees.clamp(-MAX_ABS_DEGREES, MAX_ABS_DEGREES))
}

fn step_centi(step: f64) -> i64 {
    bounded_centi(step).max(1)
}

fn snap_centi(value_centi: i64, start_centi: i64, step_centi: i64) -> i64 {
    let offset = value_centi - start_centi;
    let steps = (offset as f64 / step_centi as f64).round() as i64;
    start_centi + steps * step_centi
}

/// Snap `value` to the nearest lattice line `start + k * step`.
pub fn quantize(value: f64, start: f64, step: f64) -> f64 {
    from_centi(snap_centi(bounded_centi(value), bounded_centi(start), step_centi(step)))
}

/// Lattice bounds in centi-degrees, ready for repeated snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateQuantizer {
    lat_start: i64,
    lat_end: i64,
    lon_start: i64,
    lon_end: i64,
    step: i64,
}

impl CoordinateQuantizer {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            lat_start: bounded_centi(config.lat_start),
            lat_end: bounded_centi(config.lat_end),
            lon_start: bounded_centi(config.lon_start),
            lon_end: bounded_centi(config.lon_end),
            step: step_centi(config.step),
        }
    }

    /// Snap both axes, clamp into the lattice bounds and build the key.
    pub fn snapped_key(&self, latitude: f64, longitude: f64) -> GridKey {
        let lat = snap_centi(bounded_centi(latitude), self.lat_start, self.step);
        let lon = snap_centi(bounded_centi(longitude), self.lon_start, self.step);

        GridKey::from_centi(
            clamp_centi(lat, self.lat_start, self.lat_end),
            clamp_centi(lon, self.lon_start, self.lon_end),
        )
    }
}

fn clamp_centi(value: i64, start: i64, end: i64) -> i64 {
    if end < start {
        return start;
    }
    value.clamp(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> CoordinateQuantizer {
        CoordinateQuantizer::new(&GridConfig::default())
    }

    #[test]
    fn test_quantize_on_lattice_line() {
        assert_eq!(quantize(23.7, 21.9, 0.1), 23.7);
        assert_eq!(quantize(21.9, 21.9, 0.1), 21.9);
    }

    #[test]
    fn test_quantize_rounds_to_nearest_line() {
        assert_eq!(quantize(23.74, 21.9, 0.1), 23.7);
        assert_eq!(quantize(23.76, 21.9, 0.1), 23.8);
        assert_eq!(quantize(23.71, 21.9, 0.25), 23.65);
    }

    #[test]
    fn test_quantize_is_idempotent() {
        for raw in [21.9, 22.03, 22.55, 23.7049, 23.75, 24.6, 24.9999] {
            for step in [0.1, 0.25, 0.05] {
                let once = quantize(raw, 21.9, step);
                assert_eq!(quantize(once, 21.9, step), once, "raw={} step={}", raw, step);
            }
        }
    }

    #[test]
    fn test_snapped_key_inside_bounds() {
        assert_eq!(lattice().snapped_key(23.7, 92.8).to_string(), "23.70_92.80");
        assert_eq!(lattice().snapped_key(23.73, 92.72).to_string(), "23.70_92.70");
    }

    #[test]
    fn test_snapped_key_at_bounds() {
        let q = lattice();
        assert_eq!(q.snapped_key(21.9, 92.2).to_string(), "21.90_92.20");
        assert_eq!(q.snapped_key(24.6, 93.5).to_string(), "24.60_93.50");
    }

    #[test]
    fn test_snapped_key_clamps_outside_range() {
        let q = lattice();
        assert_eq!(q.snapped_key(24.999999, 94.999999).to_string(), "24.60_93.50");
        assert_eq!(q.snapped_key(10.0, 80.0).to_string(), "21.90_92.20");
    }

    #[test]
    fn test_snapped_key_clamps_extreme_values() {
        let q = lattice();
        assert_eq!(q.snapped_key(f64::INFINITY, 92.8).to_string(), "24.60_92.80");
        assert_eq!(q.snapped_key(f64::NEG_INFINITY, 92.8).to_string(), "21.90_92.80");
        assert_eq!(q.snapped_key(1e300, 92.8).to_string(), "24.60_92.80");
        assert_eq!(q.snapped_key(-1e30, -1e30).to_string(), "21.90_92.20");
        assert_eq!(q.snapped_key(23.7, f64::INFINITY).to_string(), "23.70_93.50");
        assert_eq!(q.snapped_key(f64::NAN, f64::NAN).to_string(), "21.90_92.20");
    }

    #[test]
    fn test_quantize_extreme_values_stay_finite() {
        assert_eq!(quantize(-1e30, 21.9, 0.1), -360.0);
        assert_eq!(quantize(1e30, 21.9, 0.1), 360.0);
        assert!(quantize(f64::INFINITY, 21.9, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_snapped_key_format() {
        let q = lattice();
        let mut lat = 21.5;
        while lat < 25.0 {
            let mut lon = 92.0;
            while lon < 94.0 {
                let key = q.snapped_key(lat, lon).to_string();
                let bytes = key.as_bytes();
                assert_eq!(key.len(), 11, "{}", key);
                assert_eq!(bytes[2], b'.');
                assert_eq!(bytes[5], b'_');
                assert_eq!(bytes[8], b'.');
                assert!(key
                    .chars()
                    .enumerate()
                    .all(|(i, c)| matches!(i, 2 | 5 | 8) || c.is_ascii_digit()));
                lon += 0.037;
            }
            lat += 0.041;
        }
    }
}
