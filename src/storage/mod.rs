//! Changeset Storage
//!
//! Persistent rolling window of accepted changesets on sled, plus the
//! replication watermark and the process lock that guards the database.

pub mod changesets;
pub mod lockfile;

pub use changesets::ChangesetStore;
pub use lockfile::ProcessLock;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
