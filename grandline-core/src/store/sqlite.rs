//! SQLite persistence backend.
//!
//! Every record is stored as JSON in one table keyed by the textual
//! [`RecordKey`]:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS records (
//!     key        TEXT PRIMARY KEY,
//!     scope      TEXT NOT NULL,
//!     data       BLOB NOT NULL,
//!     version    INTEGER NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! - WAL mode for reads while a sweep is writing
//! - JSON inside a BLOB keeps the table stable across schema changes
//! - Optional CRC-32 checksum detects save corruption
//! - A small LRU read cache in front of the table, invalidated on write

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{GrandlineError, Result};
use crate::store::backend::{Backend, StoredRecord, WriteOp};
use crate::types::{RecordKey, Scope};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    key        TEXT PRIMARY KEY,
    scope      TEXT NOT NULL,
    data       BLOB NOT NULL,
    version    INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);
CREATE INDEX IF NOT EXISTS records_scope ON records(scope);";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as a lowercase hex string.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteBackend
// ---------------------------------------------------------------------------

/// Handle to an open SQLite database holding grandline records.
///
/// ```no_run
/// # use grandline_core::store::{RecordStore, SqliteBackend};
/// # use grandline_core::config::GrandlineConfig;
/// # use grandline_core::types::{GuildId, RecordKey, UserId};
/// # use grandline_core::record::MemberRecord;
/// let config = GrandlineConfig::default();
/// let backend = SqliteBackend::open("grandline.db", &config.storage)?;
/// let store = RecordStore::new(std::sync::Arc::new(backend), config.defaults);
/// let member: MemberRecord = store.get(&RecordKey::Member(GuildId(1), UserId(2)))?;
/// # Ok::<(), grandline_core::GrandlineError>(())
/// ```
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    cache: Mutex<LruCache<RecordKey, StoredRecord>>,
    config: StorageConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GrandlineError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "grandline record store opened"
        );

        Ok(Self::with_connection(conn, config, db_path))
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`GrandlineError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::with_connection(conn, config, PathBuf::from(":memory:")))
    }

    fn with_connection(conn: Connection, config: &StorageConfig, db_path: PathBuf) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(LruCache::new(capacity)),
            config: config.clone(),
            db_path,
        }
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Copy the database to `dest_path` using SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`GrandlineError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let conn = self.conn.lock();
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Record store backup completed"
        );
        Ok(())
    }

    /// Create `<db>.bak.1`, shifting older backups up and keeping at most
    /// `config.backup_count` of them.
    ///
    /// # Errors
    ///
    /// Returns [`GrandlineError::Database`] or [`GrandlineError::Io`] on failure.
    pub fn create_rotating_backup(&self) -> Result<()> {
        if self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }
        let max = self.config.backup_count;
        if max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        self.backup(self.backup_path(1))?;

        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut p = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            p.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        p.set_extension(ext);
        p
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`. `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`GrandlineError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String =
            self.conn
                .lock()
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn current_version(tx: &Connection, key: &str) -> Result<u64> {
        let version: Option<i64> = tx
            .query_row("SELECT version FROM records WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(version.map_or(0, |v| u64::try_from(v).unwrap_or(0)))
    }
}

impl Backend for SqliteBackend {
    fn load(&self, key: &RecordKey) -> Result<Option<StoredRecord>> {
        if let Some(hit) = self.cache.lock().get(key) {
            return Ok(Some(hit.clone()));
        }

        let start = Instant::now();
        let key_str = key.to_string();
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data, version, checksum FROM records WHERE key = ?1")?;
        let row: Option<(Vec<u8>, i64, Option<String>)> = stmt
            .query_row(params![key_str], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        drop(stmt);

        let Some((data, version, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        key = %key,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, possible save corruption"
                    );
                }
            }
        }

        let record = StoredRecord {
            data,
            version: u64::try_from(version).unwrap_or(0),
        };
        debug!(
            key = %key,
            bytes = record.data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded record"
        );
        // Cached under the connection lock so a commit can't slip in between.
        self.cache.lock().put(*key, record.clone());
        drop(conn);
        Ok(Some(record))
    }

    fn save_batch(&self, ops: &[WriteOp]) -> Result<Vec<u64>> {
        let start = Instant::now();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut written = Vec::with_capacity(ops.len());
        for op in ops {
            let key_str = op.key.to_string();
            let found = Self::current_version(&tx, &key_str)?;
            if let Some(expected) = op.expected_version {
                if expected != found {
                    // Dropping the transaction rolls back earlier ops in the batch.
                    return Err(GrandlineError::Conflict {
                        key: op.key,
                        expected,
                        found,
                    });
                }
            }
            let version = found + 1;
            let checksum = self.config.checksum_enabled.then(|| crc32_hex(&op.data));
            tx.execute(
                "INSERT INTO records (key, scope, data, version, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(key) DO UPDATE SET
                    data = excluded.data,
                    version = excluded.version,
                    updated_at = excluded.updated_at,
                    checksum = excluded.checksum",
                params![
                    key_str,
                    op.key.scope().as_str(),
                    op.data,
                    i64::try_from(version).unwrap_or(i64::MAX),
                    now,
                    checksum
                ],
            )?;
            written.push((op.key, version));
        }
        tx.commit()?;
        let mut cache = self.cache.lock();
        for (key, _) in &written {
            cache.pop(key);
        }
        drop(cache);
        drop(conn);
        debug!(
            records = written.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved records"
        );
        Ok(written.into_iter().map(|(_, v)| v).collect())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM records WHERE key = ?1", params![key.to_string()])?;
        self.cache.lock().pop(key);
        Ok(deleted > 0)
    }

    fn checkpoint(&self) -> Result<()> {
        if !self.integrity_check()? {
            warn!(path = %self.db_path.display(), "integrity check failed, keeping old backups");
            return Err(GrandlineError::TransientIo(format!(
                "{} failed its integrity check",
                self.db_path.display()
            )));
        }
        self.create_rotating_backup()
    }

    fn list_keys(&self, scope: Scope) -> Result<Vec<RecordKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT key FROM records WHERE scope = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![scope.as_str()], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            let key_str = row?;
            match key_str.parse::<RecordKey>() {
                Ok(key) => keys.push(key),
                Err(_) => warn!(key = %key_str, "Skipping row with malformed key"),
            }
        }
        Ok(keys)
    }
}
