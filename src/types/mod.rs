//! Shared data structures for changeset ingestion and raid detection
//!
//! - `Changeset`: one closed edit event from the replication feed
//! - `GeoPoint`: flat (lat, lon) position used by the geographic pass
//! - `RaidCandidate`: detection output (point + population)
//! - `StoreStats`: retained-window summary

mod changeset;
mod raid;

pub use changeset::*;
pub use raid::*;
