use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{LogStore, StoreError};
use crate::protocol::LogEntry;

/// The primary persistence tier: an embedded SQLite database mapping
/// record id to the serialized record.
///
/// The rowid order of the single table is the insertion order, which is
/// what delivery drains by; there are no secondary indexes. The
/// connection opens lazily and one handle is shared across all callers.
/// The schema version is stamped into `PRAGMA user_version`; opening a
/// database with an older stamp creates the table and moves the stamp
/// forward. A database held by another writer surfaces as a busy error
/// after a short wait instead of blocking forever.
pub struct SqliteStore {
    path: PathBuf,
    table: String,
    schema_version: u32,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Creates a store over the given database file. The connection is
    /// opened on first use.
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>, schema_version: u32) -> Self {
        SqliteStore {
            path: path.into(),
            table: table.into(),
            schema_version,
            conn: Mutex::new(None),
        }
    }

    /// Forces the lazy open, reporting whether the database is usable.
    pub fn ensure_open(&self) -> Result<(), StoreError> {
        self.with_conn(|_| Ok(()))
    }

    /// Inserts a single record.
    pub fn add_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.add_logs(std::slice::from_ref(entry))
    }

    /// Inserts records in capture order within one transaction; either
    /// the whole batch lands or none of it does.
    pub fn add_logs(&self, entries: &[LogEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR REPLACE INTO {} (id, body) VALUES (?1, ?2)",
                    self.table
                ))?;
                for entry in entries {
                    // records reach the store with an id already assigned;
                    // late arrivals without one get theirs here
                    let mut entry = entry.clone();
                    if entry.id.is_none() {
                        entry.id = Some(Uuid::new_v4().to_string());
                    }
                    let body = serde_json::to_string(&entry)?;
                    stmt.execute(params![entry.id.as_deref().unwrap_or_default(), body])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Reads up to `limit` records, oldest first.
    pub fn get_logs(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        self.select(Some(limit))
    }

    /// Reads every stored record, oldest first.
    pub fn get_all_logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        self.select(None)
    }

    /// Deletes records by id. One failed delete does not abort the rest;
    /// the first error is reported after every id has been attempted.
    pub fn delete_logs(&self, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let mut first_error = None;
            for id in ids {
                if let Err(err) = conn.execute(
                    &format!("DELETE FROM {} WHERE id = ?1", self.table),
                    params![id],
                ) {
                    first_error.get_or_insert(err);
                }
            }
            match first_error {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", self.table),
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Removes every stored record.
    pub fn clear_logs(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(&format!("DELETE FROM {}", self.table), [])?;
            Ok(())
        })
    }

    fn select(&self, limit: Option<usize>) -> Result<Vec<LogEntry>, StoreError> {
        self.with_conn(|conn| {
            let sql = match limit {
                Some(limit) => format!(
                    "SELECT body FROM {} ORDER BY rowid ASC LIMIT {limit}",
                    self.table
                ),
                None => format!("SELECT body FROM {} ORDER BY rowid ASC", self.table),
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut entries = Vec::new();
            for body in rows {
                // a single corrupt row must not hide its siblings
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&body?) {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        f(guard.as_mut().expect("connection was just opened"))
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_millis(500))?;
        let stamped: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if stamped < i64::from(self.schema_version) {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, body TEXT NOT NULL)",
                self.table
            ))?;
            conn.pragma_update(None, "user_version", self.schema_version)?;
        }
        Ok(conn)
    }
}

impl LogStore for SqliteStore {
    fn append(&self, entries: &[LogEntry]) -> Result<(), StoreError> {
        self.add_logs(entries)
    }

    fn read_oldest(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError> {
        self.get_logs(limit)
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<(), StoreError> {
        self.delete_logs(ids)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.clear_logs()
    }
}
