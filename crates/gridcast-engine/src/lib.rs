//! Grid-keyed weather record resolution
//!
//! Maps an arbitrary coordinate onto the canonical key of the backing
//! document store and resolves it to a validated record, falling back to
//! nearby candidates and finally to the offline cache.

pub mod cache;
pub mod fetcher;
pub mod geo;
pub mod grid;
pub mod key;
pub mod quantize;
pub mod retry;
pub mod rings;
pub mod store;
pub mod types;
pub mod validate;

pub use cache::{FileSnapshotStore, MemorySnapshotStore, OfflineCache, SnapshotStore};
pub use fetcher::{FetchOptions, Resolution, ResolutionSource, ResilientFetcher};
pub use geo::haversine_km;
pub use grid::{nearest, GridIndex, GridPoint};
pub use key::{GridKey, KeyParseError};
pub use quantize::{quantize, CoordinateQuantizer};
pub use retry::RetryPolicy;
pub use rings::{Candidate, RingCandidateGenerator, SearchRing, DEFAULT_RINGS};
pub use store::{DocumentStore, HttpDocumentStore, StoreError};
pub use types::*;
pub use validate::{is_valid, CurrentReading};
