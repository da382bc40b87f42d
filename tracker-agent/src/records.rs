//! Typed rows exchanged with the record store.

/// Surrogate key of a row in the `files` table.
pub type FileId = i64;

/// Read position of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub offset: u64,
}

/// Identity stamped on every entry read from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySource {
    pub entity_id: String,
    pub entity_name: String,
    pub file_id: FileId,
}

/// One parsed log line, ready to be appended to the `logs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub entity_id: String,
    pub entity_name: String,
    pub actor: String,
    pub timestamp: String,
    pub epoch_seconds: i64,
    pub message: String,
    pub file_id: FileId,
}

/// A [`LogEntry`] read back from the store together with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: i64,
    pub entry: LogEntry,
}
