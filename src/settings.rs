use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PennyError, Result};
use crate::models::Owner;
use crate::writer::{WriteOptions, DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub owner_email: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_batch_retries")]
    pub batch_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_delimiter() -> char {
    ','
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_pause_ms() -> u64 {
    10
}

fn default_batch_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            owner_id: String::new(),
            owner_email: String::new(),
            delimiter: default_delimiter(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            batch_retries: default_batch_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Settings {
    /// Configured owner, with command-line overrides applied.
    pub fn owner(&self, id: Option<&str>, email: Option<&str>) -> Owner {
        let email = email.unwrap_or(&self.owner_email).trim();
        Owner {
            id: id.unwrap_or(&self.owner_id).trim().to_string(),
            email: (!email.is_empty()).then(|| email.to_string()),
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            batch_size: self.batch_size.max(1),
            batch_pause: Duration::from_millis(self.batch_pause_ms),
            batch_retries: self.batch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(crate::db::DB_FILE)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("penny")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("penny")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir())?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PennyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
