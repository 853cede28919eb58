//! Fallback candidate keys around a coordinate.
//!
//! The backing lattice is coarse while the priority points are dense, so one
//! step size cannot serve both: a coarse step misses priority points and a
//! fine step over the whole radius explodes the candidate count. Several
//! rings, each with its own `(max_offset, step)`, are scanned instead and
//! their keys unioned.

use std::collections::HashSet;

use crate::geo::haversine_km;
use crate::key::{to_centi, GridKey};

/// One tier of the expanding search, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRing {
    pub max_offset: f64,
    pub step: f64,
}

impl SearchRing {
    pub const fn new(max_offset: f64, step: f64) -> Self {
        Self { max_offset, step }
    }
}

/// Fine, medium and lattice-sized rings.
pub const DEFAULT_RINGS: [SearchRing; 3] = [
    SearchRing::new(0.10, 0.01),
    SearchRing::new(0.20, 0.05),
    SearchRing::new(0.30, 0.10),
];

/// A candidate key and its distance from the search origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub key: GridKey,
    pub distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct RingCandidateGenerator {
    rings: Vec<SearchRing>,
}

impl Default for RingCandidateGenerator {
    fn default() -> Self {
        Self::with_rings(DEFAULT_RINGS.to_vec())
    }
}

impl RingCandidateGenerator {
    pub fn with_rings(mut rings: Vec<SearchRing>) -> Self {
        rings.sort_by(|a, b| a.max_offset.total_cmp(&b.max_offset));
        Self { rings }
    }

    pub fn rings(&self) -> &[SearchRing] {
        &self.rings
    }

    /// Candidates within `max_distance_km`, closest first.
    ///
    /// Equal distances are ordered by key so the sequence is reproducible.
    pub fn candidates(&self, latitude: f64, longitude: f64, max_distance_km: f64) -> Vec<Candidate> {
        let mut keys = HashSet::new();
        for ring in &self.rings {
            ring_keys(latitude, longitude, ring, &mut keys);
        }

        let mut candidates: Vec<Candidate> = keys
            .into_iter()
            .filter(GridKey::is_on_globe)
            .map(|key| Candidate {
                key,
                distance_km: haversine_km(latitude, longitude, key.latitude(), key.longitude()),
            })
            .filter(|c| c.distance_km <= max_distance_km)
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.key.cmp(&b.key))
        });
        candidates
    }

    /// Same as [`candidates`](Self::candidates) without the distances.
    pub fn candidate_keys(&self, latitude: f64, longitude: f64, max_distance_km: f64) -> Vec<GridKey> {
        self.candidates(latitude, longitude, max_distance_km)
            .into_iter()
            .map(|c| c.key)
            .collect()
    }
}

fn ring_keys(latitude: f64, longitude: f64, ring: &SearchRing, out: &mut HashSet<GridKey>) {
    let step = to_centi(ring.step).max(1);
    let reach = to_centi(ring.max_offset) / step;

    let lat_centi = latitude * 100.0;
    let lon_centi = longitude * 100.0;

    for i in -reach..=reach {
        for j in -reach..=reach {
            let lat = (lat_centi + (i * step) as f64).round() as i64;
            let lon = (lon_centi + (j * step) as f64).round() as i64;
            out.insert(GridKey::from_centi(lat, lon));
        }
    }
}
