//! Remote sequence lookup from the feed's state descriptor
//!
//! The descriptor is plain text, one `key: value` pair per line:
//!
//! ```text
//! ---
//! last_run: 2024-05-01 12:00:03.041713000 +00:00
//! sequence: 6081234
//! ```
//!
//! Only `sequence` is consumed.

use std::sync::Arc;
use tracing::debug;

use super::source::RemoteSource;
use super::ReplicationError;
use crate::config::defaults::{SEQUENCE_KEY, STATE_RESOURCE};

/// Reads the newest sequence number published by the feed.
pub struct RemoteSequenceFetcher {
    source: Arc<dyn RemoteSource>,
}

impl RemoteSequenceFetcher {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self { source }
    }

    /// Fetch and parse the state descriptor.
    ///
    /// Any transport failure, a missing `sequence` line or an unparseable
    /// value is `RemoteUnavailable`. No retries; the next scheduled run is
    /// the retry.
    pub async fn fetch(&self) -> Result<u64, ReplicationError> {
        let body = self.source.fetch(STATE_RESOURCE).await.map_err(|e| {
            ReplicationError::RemoteUnavailable(format!(
                "{} from {}: {}",
                STATE_RESOURCE,
                self.source.describe(),
                e
            ))
        })?;

        let text = String::from_utf8_lossy(&body);
        let sequence = parse_sequence(&text).ok_or_else(|| {
            ReplicationError::RemoteUnavailable(format!(
                "no parseable '{}' line in {}",
                SEQUENCE_KEY, STATE_RESOURCE
            ))
        })?;

        debug!(sequence, "Remote replication sequence");
        Ok(sequence)
    }
}

/// Extract the `sequence` value from a state descriptor.
///
/// The first line whose key is `sequence` decides the result, even when its
/// value does not parse.
pub fn parse_sequence(text: &str) -> Option<u64> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == SEQUENCE_KEY)
        .and_then(|(_, value)| value.trim().parse().ok())
}
