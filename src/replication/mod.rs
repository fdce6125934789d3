//! Replication: remote state lookup, delta download and payload parsing
//!
//! The public changeset feed publishes a monotonically increasing sequence
//! number plus one gzip XML delta per sequence. A run fetches the current
//! sequence, computes the gap from the stored watermark and downloads the
//! gap with a bounded worker pool.

pub mod fetcher;
pub mod parser;
pub mod sequence;
pub mod source;

pub use fetcher::{missing, resource_path, ReplicationFetcher};
pub use parser::{decode_resource, parse_changesets, ParseError};
pub use sequence::{parse_sequence, RemoteSequenceFetcher};
pub use source::{HttpSource, MemorySource, RemoteSource, SourceError};

/// Failures of the replication side of an update run.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Replication feed unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("Failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("Download worker failed: {0}")]
    Worker(String),
}
