//! Incremental importer for game server entity logs.
//!
//! Each run lists the log directory, resumes every file from its last committed byte offset,
//! parses the appended lines and stores them in SQLite before advancing the offset.

pub mod config;
pub mod discovery;
pub mod error;
pub mod parsers;
pub mod records;
pub mod runner;
pub mod store;
pub mod tailer;

pub use error::{IngestError, ParseError, StoreError};
pub use records::{EntrySource, FileId, FileRecord, LogEntry, StoredEntry};
pub use runner::import::{FileOutcome, FileReport, ImportOptions, Importer, RunReport};
pub use store::RecordStore;
