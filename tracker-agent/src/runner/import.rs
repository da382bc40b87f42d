//! Batch import of every discovered log file into the record store.

use crate::discovery::discover_files;
use crate::error::{IngestError, Result};
use crate::parsers::{entity_from_path, LineParser, TimestampZone};
use crate::records::EntrySource;
use crate::store::RecordStore;
use crate::tailer::{FileTailer, TailOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub logs_dir: PathBuf,
    pub blacklist_prefixes: Vec<String>,
    pub skip_historical: bool,
    pub commit_partial_lines: bool,
    pub timezone: TimestampZone,
}

impl ImportOptions {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            blacklist_prefixes: vec!["deathlog".to_string()],
            skip_historical: false,
            commit_partial_lines: true,
            timezone: TimestampZone::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Processed { entries: usize, new_offset: u64 },
    SkippedNoNewData,
    /// First sighting with `skip_historical`: offset moved to the end, nothing imported.
    SkippedHistorical { offset: u64 },
    Failed { reason: String },
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Processed { .. } => f.write_str("processed"),
            FileOutcome::SkippedNoNewData => f.write_str("skipped-no-new-data"),
            FileOutcome::SkippedHistorical { .. } => f.write_str("skipped-historical"),
            FileOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn processed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Processed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
            .count()
    }

    pub fn entries_imported(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Processed { entries, .. } => entries,
                _ => 0,
            })
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn outcome_for(&self, path: &Path) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| &f.outcome)
    }
}

/// Drives discovery, tailing and persistence for one run.
#[derive(Debug, Clone)]
pub struct Importer {
    store: RecordStore,
    tailer: FileTailer,
    options: ImportOptions,
}

impl Importer {
    pub fn new(store: RecordStore, options: ImportOptions) -> Self {
        let tailer = FileTailer::new(
            LineParser::new(options.timezone),
            TailOptions {
                commit_partial_lines: options.commit_partial_lines,
            },
        );
        Self {
            store,
            tailer,
            options,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn into_store(self) -> RecordStore {
        self.store
    }

    /// Imports every candidate file.
    ///
    /// File-scoped failures are recorded in the report and the run continues; discovery and
    /// store failures abort the run.
    pub async fn run(&self) -> Result<RunReport> {
        let files = discover_files(&self.options.logs_dir, &self.options.blacklist_prefixes)?;
        info!(
            logs_dir = %self.options.logs_dir.display(),
            file_count = files.len(),
            "starting import"
        );

        let mut report = RunReport::default();
        for path in files {
            let outcome = match self.import_file(&path).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_file_scoped() => {
                    warn!(error = %err, path = %path.display(), "file import failed; continuing");
                    FileOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
                Err(err) => {
                    error!(error = %err, path = %path.display(), "aborting import");
                    return Err(err);
                }
            };
            info!(path = %path.display(), outcome = %outcome, "file finished");
            report.files.push(FileReport { path, outcome });
        }

        Ok(report)
    }

    pub async fn import_file(&self, path: &Path) -> Result<FileOutcome> {
        let entity = entity_from_path(path).ok_or_else(|| IngestError::FilenameFormat {
            path: path.to_path_buf(),
        })?;

        if self.options.skip_historical {
            if let Some(offset) = self.skip_history_if_unseen(path).await? {
                return Ok(FileOutcome::SkippedHistorical { offset });
            }
        }

        let file_id = self.store.ensure_file(path).await?;
        let from_offset = self.store.get_offset(path).await?;
        let source = EntrySource {
            entity_id: entity.id,
            entity_name: entity.name,
            file_id,
        };
        debug!(
            path = %path.display(),
            offset = from_offset,
            entity = %source.entity_name,
            entity_id = %source.entity_id,
            "tailing file"
        );

        let tailed = self.tailer.tail(path, from_offset, &source).await?;
        let entries = tailed.entries.len();
        for entry in tailed.entries {
            self.store.append_entry(entry).await?;
        }

        if tailed.new_offset > from_offset {
            self.store.set_offset(path, tailed.new_offset).await?;
            Ok(FileOutcome::Processed {
                entries,
                new_offset: tailed.new_offset,
            })
        } else {
            Ok(FileOutcome::SkippedNoNewData)
        }
    }

    async fn skip_history_if_unseen(&self, path: &Path) -> Result<Option<u64>> {
        if self.store.get_file(path).await?.is_some() {
            return Ok(None);
        }

        let file_len = tokio::fs::metadata(path)
            .await
            .map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        self.store.set_offset(path, file_len).await?;

        info!(
            path = %path.display(),
            offset = file_len,
            "skip_historical enabled - initialized offset to end of file"
        );
        Ok(Some(file_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    fn options(dir: &Path) -> ImportOptions {
        ImportOptions {
            timezone: TimestampZone::Utc,
            ..ImportOptions::new(dir)
        }
    }

    fn append(path: &Path, contents: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn imports_new_file_and_commits_offset() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("Goblin_1023.log");
        let contents = "[01/15/2024 13:45:02]  Orc hits Goblin for 5\nGoblin dies\n";
        append(&log, contents);

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        let report = importer.run().await.unwrap();

        assert_eq!(
            report.outcome_for(&log),
            Some(&FileOutcome::Processed {
                entries: 2,
                new_offset: contents.len() as u64
            })
        );
        let store = importer.store();
        assert_eq!(store.get_offset(&log).await.unwrap(), contents.len() as u64);

        let file_id = store.ensure_file(&log).await.unwrap();
        let stored = store.entries_for_file(file_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].entry.entity_name, "Goblin");
        assert_eq!(stored[0].entry.entity_id, "1023");
        assert_eq!(stored[0].entry.actor, "Orc");
        assert_eq!(stored[1].entry.message, "dies");
    }

    #[tokio::test]
    async fn second_run_without_new_data_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("Goblin_1023.log");
        append(&log, "Goblin dies\n");

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        importer.run().await.unwrap();
        let offset = importer.store().get_offset(&log).await.unwrap();

        let report = importer.run().await.unwrap();
        assert_eq!(report.outcome_for(&log), Some(&FileOutcome::SkippedNoNewData));
        assert_eq!(importer.store().get_offset(&log).await.unwrap(), offset);
        assert_eq!(importer.store().count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn resumes_with_only_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("Boss_Raid_77.log");
        let first = "[01/15/2024 13:45:02]  Boss spawns\n";
        append(&log, first);

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        importer.run().await.unwrap();

        let appended = "[01/15/2024 13:50:00]  Boss enrages\nBoss dies\n";
        append(&log, appended);
        let report = importer.run().await.unwrap();

        let total = (first.len() + appended.len()) as u64;
        assert_eq!(
            report.outcome_for(&log),
            Some(&FileOutcome::Processed {
                entries: 2,
                new_offset: total
            })
        );

        let file_id = importer.store().ensure_file(&log).await.unwrap();
        let stored = importer.store().entries_for_file(file_id).await.unwrap();
        let messages: Vec<_> = stored.iter().map(|s| s.entry.message.as_str()).collect();
        assert_eq!(messages, vec!["spawns", "enrages", "dies"]);
        assert_eq!(stored[2].entry.entity_name, "Boss_Raid");
        assert_eq!(stored[2].entry.entity_id, "77");
    }

    #[tokio::test]
    async fn failures_are_isolated_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("Orc_5.log");
        let healthy = dir.path().join("Goblin_1023.log");
        let unnamed = dir.path().join("notes.txt");
        append(&broken, "Orc spawns\n[2024/01/15 13:45:02]  Orc hits\n");
        append(&healthy, "Goblin dies\n");
        append(&unnamed, "free text\n");

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        let report = importer.run().await.unwrap();

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.processed_count(), 1);
        assert!(!report.is_success());
        assert!(matches!(
            report.outcome_for(&broken),
            Some(FileOutcome::Failed { .. })
        ));
        assert!(matches!(
            report.outcome_for(&unnamed),
            Some(FileOutcome::Failed { .. })
        ));

        let store = importer.store();
        assert_eq!(store.get_offset(&broken).await.unwrap(), 0);
        assert_eq!(store.count_entries().await.unwrap(), 1);
        assert!(store.get_file(&unnamed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blacklisted_files_are_never_touched() {
        let dir = tempfile::tempdir().unwrap();
        let deathlog = dir.path().join("deathlog_9.txt");
        append(&deathlog, "Goblin dies\n");

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        let report = importer.run().await.unwrap();

        assert!(report.files.is_empty());
        assert!(importer.store().get_file(&deathlog).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_historical_starts_unseen_files_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("Goblin_1023.log");
        let history = "Goblin spawns\nGoblin dies\n";
        append(&log, history);

        let opts = ImportOptions {
            skip_historical: true,
            ..options(dir.path())
        };
        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), opts);

        let report = importer.run().await.unwrap();
        assert_eq!(
            report.outcome_for(&log),
            Some(&FileOutcome::SkippedHistorical {
                offset: history.len() as u64
            })
        );
        assert_eq!(importer.store().count_entries().await.unwrap(), 0);

        append(&log, "Goblin respawns\n");
        let report = importer.run().await.unwrap();
        assert_eq!(report.entries_imported(), 1);
    }

    #[tokio::test]
    async fn missing_directory_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let importer = Importer::new(
            RecordStore::open_in_memory().unwrap(),
            options(&dir.path().join("absent")),
        );
        let err = importer.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Discovery { .. }));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            FileOutcome::Processed {
                entries: 1,
                new_offset: 4
            }
            .to_string(),
            "processed"
        );
        assert_eq!(FileOutcome::SkippedNoNewData.to_string(), "skipped-no-new-data");
        assert_eq!(
            FileOutcome::Failed {
                reason: "bad timestamp".to_string()
            }
            .to_string(),
            "failed: bad timestamp"
        );
    }

    #[tokio::test]
    async fn empty_file_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Goblin_1.log"), "").unwrap();

        let importer = Importer::new(RecordStore::open_in_memory().unwrap(), options(dir.path()));
        let report = importer.run().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.files[0].outcome, FileOutcome::SkippedNoNewData);
    }
}
