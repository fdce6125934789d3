//! Run Pipelines
//!
//! ```text
//! update:  state.yaml -> watermark -> missing ids -> worker pool (fetch, gunzip, parse)
//!          -> upsert_all -> prune -> set_state
//! detect:  load_window -> geo FOREL -> hour/day FOREL per geo cluster -> threshold
//! ```
//!
//! The watermark is written only after the batch and the prune have both
//! committed, so an aborted update is retried in full by the next run.

mod detect;
mod update;

pub use detect::{run_detect, DetectionReport};
pub use update::{run_update, UpdateSummary};

use crate::clustering::ClusterError;
use crate::replication::ReplicationError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
