use crate::error::{IngestError, Result};
use crate::parsers::{line_preview, LineParser};
use crate::records::{EntrySource, LogEntry};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    /// When false, a trailing line without `\n` is left unread for the next run.
    pub commit_partial_lines: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            commit_partial_lines: true,
        }
    }
}

/// Entries read in one pass plus the offset right after the last consumed byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOutcome {
    pub entries: Vec<LogEntry>,
    pub new_offset: u64,
    /// Lines that carried no timestamp and fell back to epoch 0.
    pub untimestamped: u64,
}

impl TailOutcome {
    fn empty(offset: u64) -> Self {
        Self {
            entries: Vec::new(),
            new_offset: offset,
            untimestamped: 0,
        }
    }
}

/// Reads the bytes appended to a file since a given offset. Persists nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTailer {
    parser: LineParser,
    options: TailOptions,
}

impl FileTailer {
    pub fn new(parser: LineParser, options: TailOptions) -> Self {
        Self { parser, options }
    }

    pub async fn tail(
        &self,
        path: &Path,
        from_offset: u64,
        source: &EntrySource,
    ) -> Result<TailOutcome> {
        let io_err = |source: std::io::Error| IngestError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = fs::File::open(path).await.map_err(io_err)?;
        let file_len = file.metadata().await.map_err(io_err)?.len();
        if from_offset >= file_len {
            if from_offset > file_len {
                warn!(
                    path = %path.display(),
                    offset = from_offset,
                    file_len,
                    "stored offset is past end of file; treating as no new data"
                );
            }
            return Ok(TailOutcome::empty(from_offset));
        }

        file.seek(SeekFrom::Start(from_offset))
            .await
            .map_err(io_err)?;
        let mut reader = BufReader::new(file);

        let mut position = from_offset;
        let mut line_number = 0u64;
        let mut buffer = Vec::new();
        let mut entries = Vec::new();
        let mut untimestamped = 0u64;

        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer).await.map_err(io_err)?;
            if read == 0 {
                break;
            }
            if !self.options.commit_partial_lines && buffer.last() != Some(&b'\n') {
                debug!(
                    path = %path.display(),
                    offset = position,
                    pending_bytes = read,
                    "leaving unterminated trailing line for the next run"
                );
                break;
            }
            line_number += 1;

            let line = std::str::from_utf8(&buffer).map_err(|_| IngestError::Decode {
                path: path.to_path_buf(),
                offset: position,
            })?;
            let parsed =
                self.parser
                    .parse(line)
                    .map_err(|source| IngestError::TimestampFormat {
                        path: path.to_path_buf(),
                        line_number,
                        offset: position,
                        source,
                    })?;

            if !parsed.has_timestamp() {
                untimestamped += 1;
            }
            trace!(
                path = %path.display(),
                line_number,
                has_timestamp = parsed.has_timestamp(),
                actor = %parsed.actor,
                line = %line_preview(&buffer),
                "parsed line"
            );

            entries.push(LogEntry {
                entity_id: source.entity_id.clone(),
                entity_name: source.entity_name.clone(),
                actor: parsed.actor,
                timestamp: parsed.timestamp,
                epoch_seconds: parsed.epoch_seconds,
                message: parsed.message,
                file_id: source.file_id,
            });
            position += read as u64;
        }

        if untimestamped > 0 {
            warn!(
                path = %path.display(),
                lines = untimestamped,
                "lines without timestamp imported with epoch 0"
            );
        }

        Ok(TailOutcome {
            entries,
            new_offset: position,
            untimestamped,
        })
    }
}
