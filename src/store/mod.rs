//! Durable buffering of captured records.
//!
//! Two tiers: the primary [`SqliteStore`] keyed by record id, and the
//! best-effort [`FileStore`] holding the serialized queue in a single
//! slot file. The delivery engine only sees the narrow [`LogStore`]
//! interface and is oblivious to which tier backs it.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::protocol::LogEntry;

/// Failure modes of the persistence tiers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database handle could not be opened or queried.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// A record could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The fallback slot would exceed its configured size.
    #[error("slot needs {needed} bytes but is capped at {limit}")]
    SlotFull { needed: usize, limit: usize },
    /// The fallback slot could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What the delivery engine needs from a persistence tier.
pub trait LogStore: Send + Sync {
    /// Appends records in order, all-or-nothing.
    fn append(&self, entries: &[LogEntry]) -> Result<(), StoreError>;

    /// Reads up to `limit` records, oldest first, without removing them.
    fn read_oldest(&self, limit: usize) -> Result<Vec<LogEntry>, StoreError>;

    /// Deletes the given ids. A failure on one id must not abort the
    /// siblings.
    fn delete_by_ids(&self, ids: &[String]) -> Result<(), StoreError>;

    /// Removes every stored record.
    fn clear(&self) -> Result<(), StoreError>;
}
