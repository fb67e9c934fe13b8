//! The Record Store: typed get / set / read-modify-write over a [`Backend`].
//!
//! Absence is never an error: reading a key that was never written yields
//! a fresh copy of the document's registered default and writes nothing.
//! Every write is versioned; read-modify-write helpers pass the version
//! they read so a write racing another writer is rejected with
//! [`GrandlineError::Conflict`] instead of silently lost.

pub mod backend;
pub mod lock;
pub mod sqlite;

use std::sync::Arc;

use tracing::debug;

use crate::config::SchemaDefaults;
use crate::error::{GrandlineError, Result};
use crate::record::Document;
use crate::types::{RecordKey, Scope};

pub use backend::{Backend, MemoryBackend, StoredRecord, WriteOp};
pub use lock::{KeyGuard, KeyLocks};
pub use sqlite::SqliteBackend;

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<D> {
    /// The document.
    pub doc: D,
    /// Stored version; 0 when the key has never been written.
    pub version: u64,
}

/// Typed access to persisted records.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn Backend>,
    defaults: SchemaDefaults,
    locks: KeyLocks,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("defaults", &self.defaults)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Wrap a backend, registering `defaults` as the default member schema.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, defaults: SchemaDefaults) -> Self {
        Self {
            backend,
            defaults,
            locks: KeyLocks::new(),
        }
    }

    /// Store backed by a fresh [`MemoryBackend`].
    #[must_use]
    pub fn in_memory(defaults: SchemaDefaults) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), defaults)
    }

    /// Advisory locks for interactive read → wait → write flows.
    #[must_use]
    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Registered default schema values.
    #[must_use]
    pub fn defaults(&self) -> &SchemaDefaults {
        &self.defaults
    }

    fn check_scope<D: Document>(key: &RecordKey) -> Result<()> {
        if key.scope() == D::SCOPE {
            Ok(())
        } else {
            Err(GrandlineError::InvalidArgument(format!(
                "{key} is a {} key, not a {} record",
                key.scope(),
                D::SCOPE
            )))
        }
    }

    fn encode<D: Document>(doc: &D) -> Result<Vec<u8>> {
        serde_json::to_vec(doc).map_err(|e| GrandlineError::Serialization(e.to_string()))
    }

    /// Decode a stored document. Top-level fields it lacks are taken from
    /// this store's registered defaults rather than the type's own.
    fn decode<D: Document>(&self, key: &RecordKey, data: &[u8]) -> Result<D> {
        let bad = |e: serde_json::Error| GrandlineError::Serialization(format!("{key}: {e}"));
        let mut stored: serde_json::Value = serde_json::from_slice(data).map_err(bad)?;
        if let (Some(fields), serde_json::Value::Object(base)) = (
            stored.as_object_mut(),
            serde_json::to_value(D::fresh(&self.defaults)).map_err(bad)?,
        ) {
            for (name, value) in base {
                fields.entry(name).or_insert(value);
            }
        }
        serde_json::from_value(stored).map_err(bad)
    }

    /// Read a record, or the registered default if it was never written.
    ///
    /// # Errors
    /// `InvalidArgument` if `key` is not in `D`'s scope; storage and decode
    /// failures otherwise.
    pub fn get<D: Document>(&self, key: &RecordKey) -> Result<D> {
        self.get_versioned(key).map(|v| v.doc)
    }

    /// Like [`get`](Self::get) but also returns the stored version.
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub fn get_versioned<D: Document>(&self, key: &RecordKey) -> Result<Versioned<D>> {
        Self::check_scope::<D>(key)?;
        match self.backend.load(key)? {
            Some(stored) => {
                let doc = self.decode(key, &stored.data)?;
                Ok(Versioned {
                    doc,
                    version: stored.version,
                })
            }
            None => Ok(Versioned {
                doc: D::fresh(&self.defaults),
                version: 0,
            }),
        }
    }

    /// Replace a record wholesale.
    ///
    /// # Errors
    /// Scope mismatch, encode and storage failures.
    pub fn set<D: Document>(&self, key: &RecordKey, doc: &D) -> Result<u64> {
        Self::check_scope::<D>(key)?;
        let data = Self::encode(doc)?;
        let version = self.backend.save(key, &data, None)?;
        debug!(key = %key, version, "record set");
        Ok(version)
    }

    /// Write `doc` only if the stored version is still `expected_version`.
    ///
    /// # Errors
    /// `Conflict` when another write landed first.
    pub fn compare_and_set<D: Document>(
        &self,
        key: &RecordKey,
        expected_version: u64,
        doc: &D,
    ) -> Result<u64> {
        Self::check_scope::<D>(key)?;
        let data = Self::encode(doc)?;
        self.backend.save(key, &data, Some(expected_version))
    }

    /// Read-modify-write in one logical step. Returns whatever the mutator
    /// returns.
    ///
    /// # Errors
    /// Storage failures, or `Conflict` if the record moved between the read
    /// and the write.
    pub fn scoped_update<D, R, F>(&self, key: &RecordKey, mutate: F) -> Result<R>
    where
        D: Document,
        F: FnOnce(&mut D) -> R,
    {
        self.try_scoped_update(key, |doc: &mut D| Ok(mutate(doc)))
    }

    /// Read-modify-write with a fallible mutator. If the mutator fails,
    /// nothing is written.
    ///
    /// # Errors
    /// The mutator's error, storage failures, or `Conflict`.
    pub fn try_scoped_update<D, R, F>(&self, key: &RecordKey, mutate: F) -> Result<R>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<R>,
    {
        let Versioned { mut doc, version } = self.get_versioned::<D>(key)?;
        let out = mutate(&mut doc)?;
        self.compare_and_set(key, version, &doc)?;
        Ok(out)
    }

    /// Mutate two records of the same type and persist both atomically.
    ///
    /// # Errors
    /// `InvalidArgument` if both keys are equal; otherwise as
    /// [`try_scoped_update`](Self::try_scoped_update).
    pub fn update_pair<D, R, F>(&self, a: &RecordKey, b: &RecordKey, mutate: F) -> Result<R>
    where
        D: Document,
        F: FnOnce(&mut D, &mut D) -> Result<R>,
    {
        if a == b {
            return Err(GrandlineError::InvalidArgument(
                "a record cannot be paired with itself".into(),
            ));
        }
        let mut first = self.get_versioned::<D>(a)?;
        let mut second = self.get_versioned::<D>(b)?;
        let out = mutate(&mut first.doc, &mut second.doc)?;

        self.backend.save_batch(&[
            WriteOp {
                key: *a,
                data: Self::encode(&first.doc)?,
                expected_version: Some(first.version),
            },
            WriteOp {
                key: *b,
                data: Self::encode(&second.doc)?,
                expected_version: Some(second.version),
            },
        ])?;
        Ok(out)
    }

    /// Remove a record. Later reads return the default again.
    ///
    /// # Errors
    /// Storage failures.
    pub fn delete(&self, key: &RecordKey) -> Result<bool> {
        self.backend.delete(key)
    }

    /// Every key stored in `scope`.
    ///
    /// # Errors
    /// Storage failures.
    pub fn list_keys(&self, scope: Scope) -> Result<Vec<RecordKey>> {
        self.backend.list_keys(scope)
    }

    /// Verify and back up the backend (see [`Backend::checkpoint`]).
    ///
    /// # Errors
    /// Storage failures.
    pub fn checkpoint(&self) -> Result<()> {
        self.backend.checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GuildRecord, MemberRecord, Weather};
    use crate::types::{GuildId, UserId};

    fn store() -> RecordStore {
        RecordStore::in_memory(SchemaDefaults::default())
    }

    fn member(u: u64) -> RecordKey {
        RecordKey::Member(GuildId(1), UserId(u))
    }

    #[test]
    fn unknown_key_reads_default_without_writing() {
        let store = store();
        let first: Versioned<MemberRecord> = store.get_versioned(&member(1)).expect("get");
        assert_eq!(first.version, 0);
        assert_eq!(first.doc, MemberRecord::default());
        assert!(store.list_keys(Scope::Member).expect("list").is_empty());
    }

    #[test]
    fn missing_fields_come_from_registered_defaults() {
        let defaults = SchemaDefaults {
            strength: 42,
            berries: 7,
            ..SchemaDefaults::default()
        };
        let backend = Arc::new(MemoryBackend::new());
        backend
            .save(&member(1), br#"{"hp":12,"bounty":3000,"crew":"straw hats"}"#, None)
            .expect("raw save");
        let store = RecordStore::new(backend, defaults);

        let m: MemberRecord = store.get(&member(1)).expect("get");
        assert_eq!(m.hp, 12);
        assert_eq!(m.bounty, 3_000);
        assert_eq!(m.strength, 42);
        assert_eq!(m.berries, 7);
        assert_eq!(m.extra.get("crew"), Some(&serde_json::json!("straw hats")));
    }

    #[test]
    fn scope_mismatch_is_invalid_argument() {
        let store = store();
        let err = store.get::<GuildRecord>(&member(1)).expect_err("mismatch");
        assert!(matches!(err, GrandlineError::InvalidArgument(_)));
    }

    #[test]
    fn set_then_get() {
        let store = store();
        let key = RecordKey::Guild(GuildId(4));
        let mut guild = GuildRecord::default();
        guild.weather = Weather::Fog;
        store.set(&key, &guild).expect("set");
        assert_eq!(store.get::<GuildRecord>(&key).expect("get").weather, Weather::Fog);
    }

    #[test]
    fn failing_mutator_persists_nothing() {
        let store = store();
        let result = store.try_scoped_update(&member(1), |m: &mut MemberRecord| {
            m.berries = 0;
            Err::<(), _>(GrandlineError::InvalidArgument("no".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.get::<MemberRecord>(&member(1)).expect("get").berries, 500);
    }

    #[test]
    fn stale_compare_and_set_conflicts() {
        let store = store();
        let read = store.get_versioned::<MemberRecord>(&member(1)).expect("get");
        store
            .scoped_update(&member(1), |m: &mut MemberRecord| m.bounty = 10)
            .expect("update");
        let err = store
            .compare_and_set(&member(1), read.version, &read.doc)
            .expect_err("stale");
        assert!(matches!(err, GrandlineError::Conflict { .. }));
    }

    #[test]
    fn update_pair_writes_both() {
        let store = store();
        store
            .update_pair(&member(1), &member(2), |a: &mut MemberRecord, b: &mut MemberRecord| {
                a.wins += 1;
                b.losses += 1;
                Ok(())
            })
            .expect("pair");
        assert_eq!(store.get::<MemberRecord>(&member(1)).expect("get").wins, 1);
        assert_eq!(store.get::<MemberRecord>(&member(2)).expect("get").losses, 1);
        assert!(store
            .update_pair(&member(1), &member(1), |_: &mut MemberRecord, _: &mut MemberRecord| Ok(()))
            .is_err());
    }
}
