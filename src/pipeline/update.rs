use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::PipelineError;
use crate::config::DetectorConfig;
use crate::replication::{missing, RemoteSequenceFetcher, RemoteSource, ReplicationFetcher};
use crate::storage::ChangesetStore;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSummary {
    pub previous_sequence: Option<u64>,
    pub remote_sequence: u64,
    pub resources_fetched: usize,
    pub changesets_stored: usize,
    pub changesets_pruned: usize,
}

/// Bring the store up to the remote sequence.
///
/// Any failure before the commit leaves both rows and watermark untouched.
pub async fn run_update(
    config: &DetectorConfig,
    store: &ChangesetStore,
    source: Arc<dyn RemoteSource>,
) -> Result<UpdateSummary, PipelineError> {
    let started = Instant::now();

    let remote_sequence = RemoteSequenceFetcher::new(source.clone()).fetch().await?;
    let previous_sequence = store.get_state()?;
    let pending = missing(previous_sequence, remote_sequence);

    if previous_sequence.is_none() {
        info!(remote_sequence, "No watermark yet, starting from the current sequence");
    } else {
        info!(
            last_consumed = previous_sequence,
            remote_sequence,
            pending = pending.len(),
            "Replication gap"
        );
    }

    let fetcher = ReplicationFetcher::new(source, config.replication.threads);
    let changesets = fetcher.fetch_all(&pending).await?;

    let changesets_stored = store.upsert_all(&changesets)?;
    let changesets_pruned = store.prune(config.storage.retention_seconds)?;
    store.set_state(remote_sequence)?;

    let summary = UpdateSummary {
        previous_sequence,
        remote_sequence,
        resources_fetched: pending.len(),
        changesets_stored,
        changesets_pruned,
    };
    info!(
        resources = summary.resources_fetched,
        stored = summary.changesets_stored,
        pruned = summary.changesets_pruned,
        watermark = remote_sequence,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Update complete"
    );
    Ok(summary)
}
