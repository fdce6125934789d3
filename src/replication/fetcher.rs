//! Delta download: gap computation, resource addressing and the worker pool

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::parser::decode_resource;
use super::source::RemoteSource;
use super::ReplicationError;
use crate::config::defaults::{MAX_ADDRESSABLE_SEQUENCE, RESOURCE_EXTENSION};
use crate::types::Changeset;

/// Sequence numbers published remotely but not yet consumed, ascending.
///
/// With no watermark the backlog is skipped entirely: the first run only
/// records the current sequence. A watermark ahead of the remote (feed
/// reset) also yields nothing.
pub fn missing(last_consumed: Option<u64>, current_remote: u64) -> Vec<u64> {
    let start = last_consumed.unwrap_or(current_remote);
    if start > current_remote {
        warn!(
            last_consumed = start,
            current_remote, "Stored watermark is ahead of the remote feed, skipping"
        );
        return Vec::new();
    }
    (start + 1..=current_remote).collect()
}

/// Feed-relative path of a sequence: `1234567` -> `001/234/567.osm.gz`.
pub fn resource_path(sequence: u64) -> Result<String, ReplicationError> {
    if sequence > MAX_ADDRESSABLE_SEQUENCE {
        return Err(ReplicationError::Fetch {
            path: sequence.to_string(),
            reason: format!("sequence exceeds {MAX_ADDRESSABLE_SEQUENCE}, not addressable"),
        });
    }
    let digits = format!("{sequence:09}");
    Ok(format!(
        "{}/{}/{}{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        RESOURCE_EXTENSION
    ))
}

/// Downloads and parses delta resources on a bounded pool.
pub struct ReplicationFetcher {
    source: Arc<dyn RemoteSource>,
    threads: usize,
}

impl ReplicationFetcher {
    pub fn new(source: Arc<dyn RemoteSource>, threads: usize) -> Self {
        Self {
            source,
            threads: threads.max(1),
        }
    }

    /// Fetch one resource and return its accepted changesets.
    pub async fn fetch_and_parse(&self, path: &str) -> Result<Vec<Changeset>, ReplicationError> {
        fetch_and_parse(self.source.as_ref(), path).await
    }

    /// Fetch every sequence in `sequences`, at most `threads` at a time.
    ///
    /// Results are concatenated in completion order. The first failure is
    /// returned and the remaining workers are aborted.
    pub async fn fetch_all(&self, sequences: &[u64]) -> Result<Vec<Changeset>, ReplicationError> {
        if sequences.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve every path up front so an unaddressable id spawns nothing
        let paths = sequences
            .iter()
            .map(|&s| resource_path(s))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            resources = paths.len(),
            threads = self.threads,
            source = %self.source.describe(),
            "Downloading replication deltas"
        );

        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut workers = JoinSet::new();

        for path in paths {
            let sem = semaphore.clone();
            let source = self.source.clone();
            workers.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| ReplicationError::Worker(e.to_string()))?;
                fetch_and_parse(source.as_ref(), &path).await
            });
        }

        let mut changesets = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let batch = joined.map_err(|e| ReplicationError::Worker(e.to_string()))??;
            changesets.extend(batch);
        }
        // Early return above drops the JoinSet, which aborts what is left

        Ok(changesets)
    }
}

async fn fetch_and_parse(
    source: &dyn RemoteSource,
    path: &str,
) -> Result<Vec<Changeset>, ReplicationError> {
    let compressed = source
        .fetch(path)
        .await
        .map_err(|e| ReplicationError::Fetch {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    let owned_path = path.to_string();
    let changesets =
        tokio::task::spawn_blocking(move || decode_resource(&owned_path, &compressed))
            .await
            .map_err(|e| ReplicationError::Worker(e.to_string()))??;

    debug!(path, accepted = changesets.len(), "Parsed delta");
    Ok(changesets)
}
