use std::fs;
use std::path::PathBuf;

use super::StoreError;
use crate::protocol::LogEntry;

/// The fallback persistence tier: one flat file holding the serialized
/// queue as a JSON array.
///
/// Semantics are best effort. Each save rewrites the whole slot and
/// refuses outright when the serialization would exceed the size cap. A
/// torn write removes the slot rather than leaving it corrupt; loading
/// consumes the slot.
pub struct FileStore {
    path: PathBuf,
    max_size: usize,
}

impl FileStore {
    /// Creates a store over the given slot file.
    pub fn new(path: impl Into<PathBuf>, max_size: usize) -> Self {
        FileStore {
            path: path.into(),
            max_size,
        }
    }

    /// Serializes the queue into the slot.
    pub fn save(&self, queue: &[LogEntry]) -> Result<(), StoreError> {
        let body = serde_json::to_vec(queue)?;
        if body.len() > self.max_size {
            return Err(StoreError::SlotFull {
                needed: body.len(),
                limit: self.max_size,
            });
        }
        if let Err(err) = fs::write(&self.path, &body) {
            let _ = fs::remove_file(&self.path);
            return Err(err.into());
        }
        Ok(())
    }

    /// Consumes the slot: returns its records and clears it. A missing or
    /// unparsable slot yields nothing.
    pub fn load(&self) -> Vec<LogEntry> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(_) => return Vec::new(),
        };
        let entries = serde_json::from_slice(&data).unwrap_or_default();
        let _ = fs::remove_file(&self.path);
        entries
    }

    /// Removes the slot.
    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }
}
