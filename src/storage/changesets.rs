//! Changeset store on sled
//!
//! Trees:
//! - `changesets`: id (sortable i64) -> JSON row
//! - `changesets_by_created_at`: created_at (sortable i64) ‖ id -> empty
//! - `config`: named values, currently only the replication watermark
//!
//! Signed keys are stored with the sign bit flipped so that big-endian byte
//! order matches numeric order.

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

use super::StorageError;
use crate::config::defaults::SERVER_SEQUENCE_KEY;
use crate::types::{Changeset, StoreStats};

const CHANGESETS_TREE: &str = "changesets";
const CREATED_AT_INDEX_TREE: &str = "changesets_by_created_at";
const CONFIG_TREE: &str = "config";

/// Persistent changeset window plus watermark.
#[derive(Clone)]
pub struct ChangesetStore {
    db: Db,
    changesets: Tree,
    index: Tree,
    config: Tree,
}

impl ChangesetStore {
    /// Open or create the store at `path` (a directory).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!(path = %path.display(), "Changeset store opened");
        Self::from_db(db)
    }

    /// Open a throwaway in-memory store (tests, dry runs).
    pub fn open_temp() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            changesets: db.open_tree(CHANGESETS_TREE)?,
            index: db.open_tree(CREATED_AT_INDEX_TREE)?,
            config: db.open_tree(CONFIG_TREE)?,
            db,
        })
    }

    // ========================================================================
    // Changesets
    // ========================================================================

    /// Insert or replace every changeset in one transaction.
    ///
    /// Rows are keyed by id; a replaced row's old index entry is removed so
    /// the `created_at` index never points at stale timestamps.
    pub fn upsert_all(&self, changesets: &[Changeset]) -> Result<usize, StorageError> {
        if changesets.is_empty() {
            return Ok(0);
        }

        let rows = changesets
            .iter()
            .map(|c| -> Result<_, StorageError> {
                Ok((sort_key(c.id), index_key(c.created_at, c.id), serde_json::to_vec(c)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        (&self.changesets, &self.index)
            .transaction(|(tx_rows, tx_index)| {
                for (id_key, created_key, json) in &rows {
                    let previous = tx_rows.insert(&id_key[..], json.as_slice())?;
                    if let Some(previous) = previous {
                        let old: Changeset = serde_json::from_slice(&previous).map_err(|e| {
                            ConflictableTransactionError::Abort(StorageError::Serialization(e))
                        })?;
                        tx_index.remove(&index_key(old.created_at, old.id)[..])?;
                    }
                    tx_index.insert(&created_key[..], &[] as &[u8])?;
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(unwrap_transaction_error)?;

        self.db.flush()?;
        debug!(count = rows.len(), "Upserted changesets");
        Ok(rows.len())
    }

    /// Delete every row older than `max(created_at) - retention_seconds`.
    ///
    /// Returns the number of rows removed. Empty store is a no-op.
    pub fn prune(&self, retention_seconds: i64) -> Result<usize, StorageError> {
        let Some((newest_key, _)) = self.index.last()? else {
            return Ok(0);
        };
        let newest = decode_created_at(&newest_key)?;
        let cutoff = sort_key(newest.saturating_sub(retention_seconds));

        let expired = self
            .index
            .range(..cutoff)
            .keys()
            .collect::<Result<Vec<IVec>, _>>()?;
        if expired.is_empty() {
            return Ok(0);
        }

        (&self.changesets, &self.index)
            .transaction(|(tx_rows, tx_index)| {
                for key in &expired {
                    tx_rows.remove(&key[8..])?;
                    tx_index.remove(key.clone())?;
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(unwrap_transaction_error)?;

        self.db.flush()?;
        info!(
            pruned = expired.len(),
            cutoff = newest.saturating_sub(retention_seconds),
            "Pruned changesets outside retention window"
        );
        Ok(expired.len())
    }

    /// Every retained changeset, ordered by `created_at` then id.
    pub fn load_window(&self) -> Result<Vec<Changeset>, StorageError> {
        let mut window = Vec::with_capacity(self.changesets.len());
        for key in self.index.iter().keys() {
            let key = key?;
            let row = self.changesets.get(&key[8..])?.ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "index entry without row (created_at {})",
                    decode_created_at(&key).unwrap_or_default()
                ))
            })?;
            window.push(serde_json::from_slice(&row)?);
        }
        debug!(count = window.len(), "Loaded changeset window");
        Ok(window)
    }

    /// Number of stored changesets.
    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    // ========================================================================
    // Watermark
    // ========================================================================

    /// Last consumed replication sequence, if one was ever recorded.
    pub fn get_state(&self) -> Result<Option<u64>, StorageError> {
        self.config
            .get(SERVER_SEQUENCE_KEY)?
            .map(|raw| {
                <[u8; 8]>::try_from(raw.as_ref())
                    .map(u64::from_be_bytes)
                    .map_err(|_| {
                        StorageError::Corrupt(format!("{SERVER_SEQUENCE_KEY} has {} bytes", raw.len()))
                    })
            })
            .transpose()
    }

    /// Record the last consumed replication sequence.
    pub fn set_state(&self, sequence: u64) -> Result<(), StorageError> {
        self.config
            .insert(SERVER_SEQUENCE_KEY, sequence.to_be_bytes().to_vec())?;
        self.db.flush()?;
        debug!(sequence, "Watermark updated");
        Ok(())
    }

    /// Summary of the window and watermark.
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let oldest = self
            .index
            .first()?
            .map(|(k, _)| decode_created_at(&k))
            .transpose()?;
        let newest = self
            .index
            .last()?
            .map(|(k, _)| decode_created_at(&k))
            .transpose()?;

        Ok(StoreStats {
            changeset_count: self.changesets.len(),
            oldest_created_at: oldest,
            newest_created_at: newest,
            server_sequence: self.get_state()?,
        })
    }
}

// ============================================================================
// Key Encoding
// ============================================================================

fn sort_key(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_sort_key(bytes: &[u8]) -> Result<i64, StorageError> {
    let raw = <[u8; 8]>::try_from(bytes)
        .map_err(|_| StorageError::Corrupt(format!("sort key of {} bytes", bytes.len())))?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

fn index_key(created_at: i64, id: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&sort_key(created_at));
    key[8..].copy_from_slice(&sort_key(id));
    key
}

fn decode_created_at(index_key: &[u8]) -> Result<i64, StorageError> {
    if index_key.len() != 16 {
        return Err(StorageError::Corrupt(format!(
            "index key of {} bytes",
            index_key.len()
        )));
    }
    decode_sort_key(&index_key[..8])
}

fn unwrap_transaction_error(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changeset(id: i64, created_at: i64) -> Changeset {
        Changeset {
            id,
            created_at,
            num_changes: 1,
            user: format!("user{id}"),
            uid: id,
            min_lat: 10.0,
            max_lat: 10.0,
            min_lon: 20.0,
            max_lon: 20.0,
        }
    }

    #[test]
    fn test_sort_key_orders_signed_values() {
        assert!(sort_key(-5) < sort_key(0));
        assert!(sort_key(0) < sort_key(1));
        assert!(sort_key(i64::MAX - 1) < sort_key(i64::MAX));
        assert_eq!(decode_sort_key(&sort_key(-1_714_564_800)).unwrap(), -1_714_564_800);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = ChangesetStore::open_temp().unwrap();
        let batch = vec![changeset(1, 100), changeset(2, 200)];
        store.upsert_all(&batch).unwrap();
        store.upsert_all(&batch).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.load_window().unwrap(), batch);
    }

    #[test]
    fn test_upsert_replaces_and_reindexes() {
        let store = ChangesetStore::open_temp().unwrap();
        store.upsert_all(&[changeset(1, 100), changeset(2, 200)]).unwrap();
        store.upsert_all(&[changeset(1, 300)]).unwrap();

        let window = store.load_window().unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, 2);
        assert_eq!(window[1].created_at, 300);
        assert_eq!(store.stats().unwrap().oldest_created_at, Some(200));
    }

    #[test]
    fn test_duplicate_ids_within_one_batch_keep_last() {
        let store = ChangesetStore::open_temp().unwrap();
        store
            .upsert_all(&[changeset(7, 100), changeset(7, 150)])
            .unwrap();
        let window = store.load_window().unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].created_at, 150);
    }

    #[test]
    fn test_load_window_orders_by_created_at() {
        let store = ChangesetStore::open_temp().unwrap();
        store
            .upsert_all(&[changeset(3, 50), changeset(1, 300), changeset(2, 100)])
            .unwrap();
        let ids: Vec<i64> = store.load_window().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_prune_enforces_retention_bound() {
        let store = ChangesetStore::open_temp().unwrap();
        let newest = 1_000_000;
        store
            .upsert_all(&[
                changeset(1, newest - 172_801),
                changeset(2, newest - 172_800),
                changeset(3, newest - 10),
                changeset(4, newest),
            ])
            .unwrap();

        assert_eq!(store.prune(172_800).unwrap(), 1);
        let window = store.load_window().unwrap();
        assert_eq!(window.len(), 3);
        assert!(window.iter().all(|c| c.created_at >= newest - 172_800));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let store = ChangesetStore::open_temp().unwrap();
        store
            .upsert_all(&[changeset(1, 0), changeset(2, 500_000)])
            .unwrap();
        assert_eq!(store.prune(172_800).unwrap(), 1);
        assert_eq!(store.prune(172_800).unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prune_empty_store() {
        let store = ChangesetStore::open_temp().unwrap();
        assert_eq!(store.prune(172_800).unwrap(), 0);
    }

    #[test]
    fn test_state_round_trip() {
        let store = ChangesetStore::open_temp().unwrap();
        assert_eq!(store.get_state().unwrap(), None);
        store.set_state(6_081_234).unwrap();
        assert_eq!(store.get_state().unwrap(), Some(6_081_234));
        store.set_state(6_081_240).unwrap();
        assert_eq!(store.get_state().unwrap(), Some(6_081_240));
    }

    #[test]
    fn test_stats() {
        let store = ChangesetStore::open_temp().unwrap();
        let empty = store.stats().unwrap();
        assert_eq!(empty.changeset_count, 0);
        assert_eq!(empty.oldest_created_at, None);

        store
            .upsert_all(&[changeset(1, 3_600), changeset(2, 10_800)])
            .unwrap();
        store.set_state(9).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.changeset_count, 2);
        assert_eq!(stats.oldest_created_at, Some(3_600));
        assert_eq!(stats.newest_created_at, Some(10_800));
        assert_eq!(stats.server_sequence, Some(9));
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = ChangesetStore::open(&path).unwrap();
            store.upsert_all(&[changeset(1, 100)]).unwrap();
            store.set_state(5).unwrap();
        }
        let store = ChangesetStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_state().unwrap(), Some(5));
    }
}
