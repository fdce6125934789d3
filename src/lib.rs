//! raid-detector: OpenStreetMap changeset raid detection
//!
//! Follows the public changeset replication feed into a rolling 48-hour
//! window and looks for bursts of co-located, co-temporal edits.
//!
//! ## Architecture
//!
//! - **Replication**: remote sequence lookup, bounded-parallel delta download, XML filter
//! - **Storage**: sled changeset window with `created_at` index and watermark
//! - **Clustering**: FOREL over bounding-box centers, then over creation times
//! - **Detection**: population threshold on hour-scale clusters, GeoJSON output

pub mod clustering;
pub mod config;
pub mod detection;
pub mod pipeline;
pub mod replication;
pub mod storage;
pub mod types;

pub use config::DetectorConfig;

pub use types::{Changeset, GeoPoint, RaidCandidate, StoreStats};

pub use clustering::{ClusterError, ClusteringReport, Forel, SpatioTemporalClusterer};
pub use detection::RaidDetector;
pub use pipeline::{run_detect, run_update, DetectionReport, PipelineError, UpdateSummary};
pub use replication::{HttpSource, MemorySource, RemoteSource, ReplicationError};
pub use storage::{ChangesetStore, ProcessLock, StorageError};
