use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the SQLite-backed record store. Always fatal to a run.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("corrupt offset {offset} stored for {path}")]
    CorruptOffset { path: String, offset: i64 },
}

/// A single line could not be turned into an entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed timestamp {timestamp:?} ({reason}) in line {line:?}")]
    TimestampFormat {
        timestamp: String,
        reason: String,
        line: String,
    },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to list {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filename {} lacks an <entity>_<id> suffix", path.display())]
    FilenameFormat { path: PathBuf },

    #[error("{} line {line_number} (byte {offset}): {source}", path.display())]
    TimestampFormat {
        path: PathBuf,
        /// 1-based line number counted from where this pass started reading.
        line_number: u64,
        offset: u64,
        #[source]
        source: ParseError,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} contains invalid UTF-8 at byte offset {offset}", path.display())]
    Decode { path: PathBuf, offset: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// File-scoped errors are reported and the run moves on to the next file.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            IngestError::FilenameFormat { .. }
                | IngestError::TimestampFormat { .. }
                | IngestError::Io { .. }
                | IngestError::Decode { .. }
        )
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
