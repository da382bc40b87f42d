//! Application runner for the tracker agent.
//!
//! One call to [`run`] is one batch pass over the configured log directory.

pub mod import;

use crate::config::Config;
use crate::store::RecordStore;
use anyhow::{Context, Result};
use import::{FileOutcome, Importer, RunReport};
use tracing::{info, warn};

/// Opens the store, imports every candidate file and closes the store again.
pub async fn run(config: &Config) -> Result<RunReport> {
    let db_path = config.db_path();
    let store = RecordStore::connect(&db_path)
        .await
        .with_context(|| format!("failed to open record store {}", db_path.display()))?;

    let importer = Importer::new(store, config.import_options());
    let report = importer.run().await.context("import aborted")?;

    importer
        .into_store()
        .close()
        .context("failed to close record store")?;

    log_report(&report);
    Ok(report)
}

pub fn log_report(report: &RunReport) {
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Failed { .. } => {
                warn!(path = %file.path.display(), outcome = %file.outcome, "file report")
            }
            _ => info!(path = %file.path.display(), outcome = %file.outcome, "file report"),
        }
    }

    if report.is_success() {
        info!(
            files = report.files.len(),
            processed = report.processed_count(),
            entries = report.entries_imported(),
            "import finished"
        );
    } else {
        warn!(
            files = report.files.len(),
            processed = report.processed_count(),
            failed = report.failed_count(),
            entries = report.entries_imported(),
            "import finished with failures"
        );
    }
}
