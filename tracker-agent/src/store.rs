//! SQLite-backed record store: per-file read offsets and the parsed log entries.

use crate::error::StoreError;
use crate::records::{FileId, FileRecord, LogEntry, StoredEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::debug;

type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Owns the connection for the lifetime of a run.
///
/// Every operation runs on the blocking pool and holds the connection lock for its duration,
/// so writes through one store are serialized.
#[derive(Debug, Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    path: Arc<PathBuf>,
}

impl RecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn, path)
    }

    /// [`RecordStore::open`] on the blocking pool, for callers already inside the runtime.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        task::spawn_blocking(move || Self::open(path)).await?
    }

    /// Store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        initialize_schema(&conn)?;
        debug!(path = %path.display(), "record store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            op(&guard)
        })
        .await?
    }

    /// Returns the id for `file_path`, creating the record at offset 0 on first sight.
    pub async fn ensure_file(&self, file_path: &Path) -> Result<FileId> {
        let path = normalize_path(file_path);
        self.with_conn(move |conn| {
            conn.execute(
                "
                INSERT INTO files (file_path, file_offset)
                VALUES (?1, 0)
                ON CONFLICT(file_path) DO NOTHING
                ",
                params![path],
            )?;
            let id = conn.query_row(
                "SELECT id FROM files WHERE file_path = ?1",
                params![path],
                |row| row.get::<_, i64>("id"),
            )?;
            Ok(id)
        })
        .await
    }

    pub async fn get_file(&self, file_path: &Path) -> Result<Option<FileRecord>> {
        let path = normalize_path(file_path);
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT id, file_path, file_offset FROM files WHERE file_path = ?1",
                    params![path],
                    |row| {
                        Ok((
                            row.get::<_, i64>("id")?,
                            row.get::<_, String>("file_path")?,
                            row.get::<_, i64>("file_offset")?,
                        ))
                    },
                )
                .optional()?;

            raw.map(|(id, path, offset)| -> Result<FileRecord> {
                let offset =
                    u64::try_from(offset).map_err(|_| StoreError::CorruptOffset {
                        path: path.clone(),
                        offset,
                    })?;
                Ok(FileRecord { id, path, offset })
            })
            .transpose()
        })
        .await
    }

    /// Last committed offset, or 0 for a file that was never seen.
    pub async fn get_offset(&self, file_path: &Path) -> Result<u64> {
        Ok(self
            .get_file(file_path)
            .await?
            .map(|rec| rec.offset)
            .unwrap_or(0))
    }

    pub async fn set_offset(&self, file_path: &Path, offset: u64) -> Result<()> {
        let path = normalize_path(file_path);
        self.with_conn(move |conn| {
            conn.execute(
                "
                INSERT INTO files (file_path, file_offset)
                VALUES (?1, ?2)
                ON CONFLICT(file_path) DO UPDATE SET
                    file_offset = excluded.file_offset
                ",
                params![path, offset as i64],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn append_entry(&self, entry: LogEntry) -> Result<i64> {
        self.with_conn(move |conn| {
            conn.execute(
                "
                INSERT INTO logs (
                    entity_id,
                    entity_name,
                    player_name,
                    datetime,
                    epoch,
                    log,
                    file_id
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    entry.entity_id,
                    entry.entity_name,
                    entry.actor,
                    entry.timestamp,
                    entry.epoch_seconds,
                    entry.message,
                    entry.file_id
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Entries of one file in insertion order.
    pub async fn entries_for_file(&self, file_id: FileId) -> Result<Vec<StoredEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "
                SELECT id, entity_id, entity_name, player_name, datetime, epoch, log, file_id
                FROM logs
                WHERE file_id = ?1
                ORDER BY id
                ",
            )?;
            let rows = stmt.query_map(params![file_id], stored_entry_from_row)?;
            let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    pub async fn count_entries(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count =
                conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get::<_, i64>(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Closes the connection if this is the last handle to it.
    pub fn close(self) -> Result<()> {
        let path = Arc::clone(&self.path);
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| StoreError::Poisoned)?;
                conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
                debug!(path = %path.display(), "record store closed");
            }
            Err(_) => {
                debug!(path = %path.display(), "record store still shared; leaving connection open");
            }
        }
        Ok(())
    }
}

fn stored_entry_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    Ok(StoredEntry {
        id: row.get("id")?,
        entry: LogEntry {
            entity_id: row.get("entity_id")?,
            entity_name: row.get("entity_name")?,
            actor: row.get("player_name")?,
            timestamp: row.get::<_, Option<String>>("datetime")?.unwrap_or_default(),
            epoch_seconds: row.get::<_, Option<i64>>("epoch")?.unwrap_or(0),
            message: row.get("log")?,
            file_id: row.get("file_id")?,
        },
    })
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            file_offset INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            player_name TEXT NOT NULL,
            datetime TEXT,
            log TEXT NOT NULL,
            epoch INTEGER,
            file_id INTEGER NOT NULL REFERENCES files(id)
        );
        CREATE INDEX IF NOT EXISTS logs_file_id ON logs(file_id);
        ",
    )?;
    Ok(())
}
