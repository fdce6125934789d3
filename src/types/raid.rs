//! Detection outputs and store summaries

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// A detected burst of co-located, co-temporal activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidCandidate {
    /// Representative point: the bounding-box center of the cluster's first member
    pub center: GeoPoint,
    /// Cluster population
    pub magnitude: usize,
}

/// Summary of the retained window and replication watermark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub changeset_count: usize,
    pub oldest_created_at: Option<i64>,
    pub newest_created_at: Option<i64>,
    pub server_sequence: Option<u64>,
}

impl StoreStats {
    /// Span of the retained window in hours.
    pub fn window_hours(&self) -> Option<f64> {
        match (self.oldest_created_at, self.newest_created_at) {
            (Some(oldest), Some(newest)) => Some((newest - oldest) as f64 / 3600.0),
            _ => None,
        }
    }
}
