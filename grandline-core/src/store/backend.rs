//! Persistence backend abstraction and the in-memory implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{GrandlineError, Result};
use crate::types::{RecordKey, Scope};

/// Raw stored document plus its write version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// JSON-encoded document.
    pub data: Vec<u8>,
    /// Incremented by every successful write; 0 means "never written".
    pub version: u64,
}

/// One write in a batch.
#[derive(Debug, Clone)]
pub struct WriteOp {
    /// Target record.
    pub key: RecordKey,
    /// JSON-encoded document.
    pub data: Vec<u8>,
    /// Version the caller read, or `None` for a blind write.
    pub expected_version: Option<u64>,
}

/// Durable key-value layer behind the [`RecordStore`](super::RecordStore).
///
/// Writes that carry an `expected_version` must be rejected with
/// [`GrandlineError::Conflict`] when the stored version differs.
pub trait Backend: Send + Sync {
    /// Load the stored record, or `None` if the key was never written.
    ///
    /// # Errors
    /// Storage failures.
    fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>>;

    /// Apply every write or none of them. Returns the new versions in order.
    ///
    /// # Errors
    /// `Conflict` on a version mismatch, otherwise storage failures.
    fn save_batch(&self, ops: &[WriteOp]) -> Result<Vec<u64>>;

    /// Remove a record. Returns whether anything was deleted.
    ///
    /// # Errors
    /// Storage failures.
    fn delete(&self, key: &RecordKey) -> Result<bool>;

    /// All keys currently stored in `scope`.
    ///
    /// # Errors
    /// Storage failures.
    fn list_keys(&self, scope: Scope) -> Result<Vec<RecordKey>>;

    /// Make what has been written safe to lose the process over: verify
    /// and back up where the backend supports it. No-op by default.
    ///
    /// # Errors
    /// Storage failures, or `TransientIo` if a check finds corruption.
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }

    /// Upsert a single record. Returns the new version.
    ///
    /// # Errors
    /// `Conflict` on a version mismatch, otherwise storage failures.
    fn save(&self, key: &RecordKey, data: &[u8], expected_version: Option<u64>) -> Result<u64> {
        let versions = self.save_batch(&[WriteOp {
            key: *key,
            data: data.to_vec(),
            expected_version,
        }])?;
        versions
            .first()
            .copied()
            .ok_or_else(|| GrandlineError::TransientIo("backend returned no version".into()))
    }
}

/// Process-local backend. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<RecordKey, StoredRecord>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Backend for MemoryBackend {
    fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn save_batch(&self, ops: &[WriteOp]) -> Result<Vec<u64>> {
        let mut records = self.records.lock();

        // Check every precondition before touching anything.
        for op in ops {
            if let Some(expected) = op.expected_version {
                let found = records.get(&op.key).map_or(0, |r| r.version);
                if found != expected {
                    return Err(GrandlineError::Conflict {
                        key: op.key,
                        expected,
                        found,
                    });
                }
            }
        }

        let mut versions = Vec::with_capacity(ops.len());
        for op in ops {
            let entry = records.entry(op.key).or_insert_with(|| StoredRecord {
                data: Vec::new(),
                version: 0,
            });
            entry.data.clone_from(&op.data);
            entry.version += 1;
            versions.push(entry.version);
        }
        Ok(versions)
    }

    fn delete(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.records.lock().remove(key).is_some())
    }

    fn list_keys(&self, scope: Scope) -> Result<Vec<RecordKey>> {
        let mut keys: Vec<RecordKey> = self
            .records
            .lock()
            .keys()
            .filter(|k| k.scope() == scope)
            .copied()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GuildId, UserId};

    #[test]
    fn versions_increment_per_write() {
        let backend = MemoryBackend::new();
        let key = RecordKey::Guild(GuildId(1));
        assert_eq!(backend.save(&key, b"{}", None).expect("save"), 1);
        assert_eq!(backend.save(&key, b"{}", Some(1)).expect("save"), 2);
        assert_eq!(backend.load(&key).expect("load").map(|r| r.version), Some(2));
    }

    #[test]
    fn stale_version_conflicts() {
        let backend = MemoryBackend::new();
        let key = RecordKey::User(UserId(5));
        backend.save(&key, b"{}", None).expect("save");
        let err = backend.save(&key, b"{}", Some(0)).expect_err("conflict");
        assert!(matches!(err, GrandlineError::Conflict { expected: 0, found: 1, .. }));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let backend = MemoryBackend::new();
        let a = RecordKey::Member(GuildId(1), UserId(1));
        let b = RecordKey::Member(GuildId(1), UserId(2));
        backend.save(&b, b"{}", None).expect("save");

        let ops = [
            WriteOp { key: a, data: b"{\"x\":1}".to_vec(), expected_version: Some(0) },
            WriteOp { key: b, data: b"{\"x\":2}".to_vec(), expected_version: Some(7) },
        ];
        assert!(backend.save_batch(&ops).is_err());
        assert!(backend.load(&a).expect("load").is_none());
    }

    #[test]
    fn list_keys_filters_scope() {
        let backend = MemoryBackend::new();
        backend.save(&RecordKey::Global, b"{}", None).expect("save");
        backend.save(&RecordKey::Member(GuildId(1), UserId(2)), b"{}", None).expect("save");
        backend.save(&RecordKey::Member(GuildId(1), UserId(1)), b"{}", None).expect("save");

        let members = backend.list_keys(Scope::Member).expect("list");
        assert_eq!(
            members,
            vec![
                RecordKey::Member(GuildId(1), UserId(1)),
                RecordKey::Member(GuildId(1), UserId(2)),
            ]
        );
        assert_eq!(backend.list_keys(Scope::Guild).expect("list"), vec![]);
    }
}
