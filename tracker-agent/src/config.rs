use crate::parsers::TimestampZone;
use crate::runner::import::ImportOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML configuration file.
pub const CONFIG_ENV: &str = "TRACKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "tracker.toml";

const DEFAULT_LOGS_DIR: &str = "./samples";
const DEFAULT_DB_PATH: &str = "./tracker.db";
const DEFAULT_BLACKLIST_PREFIX: &str = "deathlog";
const DEFAULT_COMMIT_PARTIAL_LINES: bool = true;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub tailer: TailerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    /// Filenames starting with any of these prefixes are never imported.
    #[serde(default = "default_blacklist_prefixes")]
    pub blacklist_prefixes: Vec<String>,
    /// Start unseen files at their current end instead of importing their history.
    #[serde(default)]
    pub skip_historical: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ParserConfig {
    #[serde(default)]
    pub timezone: TimestampZone,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TailerConfig {
    /// Consume a trailing line that has no terminator yet (and never see the rest of it).
    #[serde(default = "default_commit_partial_lines")]
    pub commit_partial_lines: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            blacklist_prefixes: default_blacklist_prefixes(),
            skip_historical: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            commit_partial_lines: DEFAULT_COMMIT_PARTIAL_LINES,
        }
    }
}

fn default_logs_dir() -> String {
    DEFAULT_LOGS_DIR.to_string()
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_blacklist_prefixes() -> Vec<String> {
    vec![DEFAULT_BLACKLIST_PREFIX.to_string()]
}

fn default_commit_partial_lines() -> bool {
    DEFAULT_COMMIT_PARTIAL_LINES
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration for a run.
    ///
    /// An explicit `TRACKER_CONFIG` must point at a readable file. Without it the default
    /// `tracker.toml` is used when present, otherwise the built-in defaults apply.
    pub fn load_from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(&path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            Err(_) => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.source.logs_dir.trim().is_empty() {
            anyhow::bail!("source.logs_dir cannot be empty");
        }
        if self.store.db_path.trim().is_empty() {
            anyhow::bail!("store.db_path cannot be empty");
        }
        if self.source.blacklist_prefixes.iter().any(|p| p.is_empty()) {
            anyhow::bail!("source.blacklist_prefixes cannot contain empty prefixes");
        }
        Ok(())
    }

    pub fn logs_dir(&self) -> PathBuf {
        expand_path(&self.source.logs_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        expand_path(&self.store.db_path)
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            logs_dir: self.logs_dir(),
            blacklist_prefixes: self.source.blacklist_prefixes.clone(),
            skip_historical: self.source.skip_historical,
            commit_partial_lines: self.tailer.commit_partial_lines,
            timezone: self.parser.timezone,
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    PathBuf::from(expanded.as_ref())
}
