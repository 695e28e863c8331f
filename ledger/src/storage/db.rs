//! # SnapshotDb: Persistent Snapshot Store
//!
//! Durable home for market snapshots, built on sled's embedded key-value
//! store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                   | Value               |
//! |-------------|-----------------------|---------------------|
//! | `snapshots` | `sequence` (8B BE)    | `bincode(snapshot)` |
//! | `metadata`  | key (UTF-8)           | value (bytes)       |
//!
//! Sequences are stored big-endian so that sled's lexicographic ordering
//! matches numeric ordering and the newest snapshot is the last key.
//!
//! ## Atomicity
//!
//! A snapshot and the `latest_sequence` pointer are written in one sled
//! transaction spanning both trees. Either both land on disk or neither
//! does.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stale snapshot sequence {attempted}: latest is {latest}")]
    StaleSequence { latest: u64, attempted: u64 },

    #[error("snapshot write aborted")]
    Aborted,
}

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the newest snapshot sequence.
const META_LATEST_SEQUENCE: &[u8] = b"latest_snapshot_sequence";

// ---------------------------------------------------------------------------
// SnapshotDb
// ---------------------------------------------------------------------------

/// Persistent store of sequenced snapshots.
///
/// Generic over the snapshot type: anything serde can encode with bincode.
/// sled is internally synchronized, so a `SnapshotDb` can be cloned and
/// shared across threads.
#[derive(Debug, Clone)]
pub struct SnapshotDb {
    db: Db,
    snapshots: Tree,
    metadata: Tree,
}

impl SnapshotDb {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a store that lives in memory and is discarded on drop.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            metadata,
        })
    }

    /// Persist `snapshot` under `sequence` and mark it as the latest.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StaleSequence`] if `sequence` is not greater
    /// than the latest stored sequence.
    pub fn save<T: Serialize>(&self, sequence: u64, snapshot: &T) -> StorageResult<()> {
        if let Some(latest) = self.latest_sequence()? {
            if sequence <= latest {
                return Err(StorageError::StaleSequence {
                    latest,
                    attempted: sequence,
                });
            }
        }

        let key = sequence.to_be_bytes();
        let bytes =
            bincode::serialize(snapshot).map_err(|e| StorageError::Serialization(e.to_string()))?;

        (&self.snapshots, &self.metadata)
            .transaction(|(snapshots, metadata)| {
                snapshots.insert(&key[..], bytes.as_slice())?;
                metadata.insert(META_LATEST_SEQUENCE, &key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(err) => StorageError::Sled(err),
                TransactionError::Abort(()) => StorageError::Aborted,
            })?;

        self.db.flush()?;
        tracing::debug!(sequence, bytes = bytes.len(), "snapshot persisted");
        Ok(())
    }

    /// Load the snapshot stored under `sequence`.
    pub fn load<T: DeserializeOwned>(&self, sequence: u64) -> StorageResult<Option<T>> {
        match self.snapshots.get(sequence.to_be_bytes())? {
            Some(bytes) => {
                let snapshot = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Load the newest snapshot together with its sequence.
    pub fn load_latest<T: DeserializeOwned>(&self) -> StorageResult<Option<(u64, T)>> {
        let Some(sequence) = self.latest_sequence()? else {
            return Ok(None);
        };
        Ok(self.load(sequence)?.map(|snapshot| (sequence, snapshot)))
    }

    /// The newest stored sequence, if any snapshot exists.
    pub fn latest_sequence(&self) -> StorageResult<Option<u64>> {
        match self.metadata.get(META_LATEST_SEQUENCE)? {
            Some(bytes) => Ok(Some(decode_sequence(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete every snapshot older than `sequence`. Returns how many were
    /// removed. The latest snapshot is never pruned.
    pub fn prune_before(&self, sequence: u64) -> StorageResult<usize> {
        let cutoff = match self.latest_sequence()? {
            Some(latest) => sequence.min(latest),
            None => return Ok(0),
        };

        let mut removed = 0;
        for entry in self.snapshots.range(..cutoff.to_be_bytes()) {
            let (key, _) = entry?;
            self.snapshots.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Number of snapshots currently stored.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_sequence(bytes: &[u8]) -> StorageResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Serialization("invalid sequence bytes".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        label: String,
        values: Vec<(u64, u64)>,
    }

    fn sample(label: &str) -> Sample {
        Sample {
            label: label.to_string(),
            values: vec![(1, 100), (2, 250)],
        }
    }

    #[test]
    fn empty_store_has_nothing() {
        let db = SnapshotDb::open_temporary().unwrap();
        assert_eq!(db.latest_sequence().unwrap(), None);
        assert!(db.load_latest::<Sample>().unwrap().is_none());
        assert_eq!(db.snapshot_count(), 0);
    }

    #[test]
    fn save_and_load_latest() {
        let db = SnapshotDb::open_temporary().unwrap();
        db.save(1, &sample("first")).unwrap();
        db.save(5, &sample("second")).unwrap();

        let (seq, latest): (u64, Sample) = db.load_latest().unwrap().unwrap();
        assert_eq!(seq, 5);
        assert_eq!(latest, sample("second"));
        assert_eq!(db.load::<Sample>(1).unwrap(), Some(sample("first")));
        assert_eq!(db.load::<Sample>(2).unwrap(), None);
    }

    #[test]
    fn stale_sequence_rejected() {
        let db = SnapshotDb::open_temporary().unwrap();
        db.save(3, &sample("a")).unwrap();
        let err = db.save(3, &sample("b")).unwrap_err();
        assert!(matches!(err, StorageError::StaleSequence { latest: 3, attempted: 3 }));
        assert_eq!(db.load::<Sample>(3).unwrap(), Some(sample("a")));
    }

    #[test]
    fn prune_keeps_latest() {
        let db = SnapshotDb::open_temporary().unwrap();
        for seq in 1..=4 {
            db.save(seq, &sample("s")).unwrap();
        }
        assert_eq!(db.prune_before(10).unwrap(), 3);
        assert_eq!(db.snapshot_count(), 1);
        assert_eq!(db.latest_sequence().unwrap(), Some(4));
        assert!(db.load::<Sample>(4).unwrap().is_some());
    }

    #[test]
    fn reopen_persistent_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = SnapshotDb::open(dir.path()).unwrap();
            db.save(7, &sample("durable")).unwrap();
        }
        let db = SnapshotDb::open(dir.path()).unwrap();
        let (seq, snap): (u64, Sample) = db.load_latest().unwrap().unwrap();
        assert_eq!(seq, 7);
        assert_eq!(snap.label, "durable");
    }
}
