//! The immutable set of known sample points.
//!
//! Built once from the lattice definition plus the curated priority points
//! and then shared by reference (`Arc<GridIndex>`) with everything that
//! needs it.

use std::collections::BTreeSet;

use gridcast_core::{GridConfig, PriorityPoint};

use crate::geo::haversine_km;
use crate::key::{to_centi, GridKey};

/// A known sample point of the backing store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub key: GridKey,
}

impl From<GridKey> for GridPoint {
    fn from(key: GridKey) -> Self {
        Self {
            latitude: key.latitude(),
            longitude: key.longitude(),
            key,
        }
    }
}

/// Deduplicated, `(lat, lon)`-sorted sample points.
#[derive(Debug, Clone)]
pub struct GridIndex {
    config: GridConfig,
    points: Vec<GridPoint>,
}

impl GridIndex {
    /// Build from the lattice and the priority points listed in `config`.
    pub fn build(config: &GridConfig) -> Self {
        Self::build_with(config, &config.priority_points)
    }

    /// Build from the lattice in `config` and an explicit priority list.
    pub fn build_with(config: &GridConfig, priority_points: &[PriorityPoint]) -> Self {
        // Keys order by (lat, lon) in centi-degrees, so the set both
        // dedups and sorts.
        let mut keys = BTreeSet::new();

        let step = to_centi(config.step).max(1);
        let (lat_start, lat_end) = (to_centi(config.lat_start), to_centi(config.lat_end));
        let (lon_start, lon_end) = (to_centi(config.lon_start), to_centi(config.lon_end));

        let lat_steps = (lat_end - lat_start).div_euclid(step);
        let lon_steps = (lon_end - lon_start).div_euclid(step);

        for i in 0..=lat_steps {
            for j in 0..=lon_steps {
                keys.insert(GridKey::from_centi(lat_start + i * step, lon_start + j * step));
            }
        }

        let lattice_len = keys.len();
        for point in priority_points {
            keys.insert(GridKey::from_degrees(point.latitude, point.longitude));
        }

        tracing::debug!(
            "Built grid index: {} lattice points, {} total after priority merge",
            lattice_len,
            keys.len()
        );

        Self {
            config: config.clone(),
            points: keys.into_iter().map(GridPoint::from).collect(),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, key: &GridKey) -> bool {
        self.points.binary_search_by(|p| p.key.cmp(key)).is_ok()
    }

    /// Closest indexed point by great-circle distance.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&GridPoint> {
        nearest(latitude, longitude, &self.points)
    }
}

/// Linear scan for the point closest to `(latitude, longitude)`.
///
/// Ties go to the earliest point in `points`. Returns `None` only for an
/// empty slice.
pub fn nearest(latitude: f64, longitude: f64, points: &[GridPoint]) -> Option<&GridPoint> {
    let mut best: Option<(&GridPoint, f64)> = None;

    for point in points {
        let distance = haversine_km(latitude, longitude, point.latitude, point.longitude);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((point, distance)),
        }
    }

    best.map(|(point, _)| point)
}
