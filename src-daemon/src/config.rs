use std::fs;
use std::path::{Path, PathBuf};

use crm_mail_core::SessionConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no config directory on this platform; pass --config")]
    MissingConfigDir,

    #[error(transparent)]
    Handlers(#[from] crm_mail_core::ConfigError),
}

// ── Daemon config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub imap: SessionConfig,
    #[serde(rename = "processorName", default = "default_processor_name")]
    pub processor_name: String,
    /// Enabled handler keywords; empty enables all of them.
    #[serde(default)]
    pub handlers: Vec<String>,
    #[serde(default)]
    pub quiet: bool,
    #[serde(rename = "dataFile")]
    pub data_file: PathBuf,
    #[serde(rename = "logDir", default)]
    pub log_dir: Option<PathBuf>,
    #[serde(rename = "watchIntervalSecs", default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_processor_name() -> String {
    "dropbox".to_string()
}

fn default_watch_interval() -> u64 {
    300
}

impl DaemonConfig {
    /// Reads the config file. Relative paths inside it are resolved against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: DaemonConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.data_file = resolve(base, &config.data_file);
        config.log_dir = config.log_dir.map(|dir| resolve(base, &dir));
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("crm-mail").join("config.json"))
            .ok_or(ConfigError::MissingConfigDir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("crm-mail").join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
