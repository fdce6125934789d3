//! Spatiotemporal clustering of changesets
//!
//! `forel` holds the generic partitioner; `spatiotemporal` applies it first
//! to bounding-box centers and then, inside each geographic cluster, to
//! creation times at hour and day scale.

pub mod forel;
pub mod spatiotemporal;

pub use forel::{Forel, Point};
pub use spatiotemporal::{ClusteringReport, SpatioTemporalClusterer};

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// A center drifted to a spot with no items within the radius.
    #[error("Degenerate cluster: no members within {radius} of center {center}")]
    Degenerate { center: String, radius: f64 },
}
