//! Changeset record and its derived geometry

use serde::{Deserialize, Serialize};

// ============================================================================
// Geographic Point
// ============================================================================

/// A (lat, lon) pair treated as a flat 2-vector.
///
/// No great-circle correction is applied anywhere; the clustering radius is
/// expressed in degrees and the working areas are city-scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

// ============================================================================
// Changeset
// ============================================================================

/// One closed, attributed, geographically bounded batch of edits.
///
/// Rows are immutable once stored: re-ingesting the same `id` replaces the
/// whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Globally unique changeset id (primary key)
    pub id: i64,
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Number of edits; accepted changesets always carry at least one
    pub num_changes: i64,
    /// Display name of the author (empty when the feed omits it)
    pub user: String,
    /// Numeric author id
    pub uid: i64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Changeset {
    /// Center of the bounding box.
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    /// Bounding box perimeter in degrees.
    ///
    /// Not consulted by clustering; kept as a reserved size metric.
    pub fn perimeter(&self) -> f64 {
        2.0 * ((self.max_lat - self.min_lat).abs() + (self.max_lon - self.min_lon).abs())
    }

    /// `created_at` as a float, the position used by the temporal passes.
    pub fn time_position(&self) -> f64 {
        self.created_at as f64
    }
}
