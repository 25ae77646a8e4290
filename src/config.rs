//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collector::DEFAULT_IGNORED_PREFIXES;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds to sleep between collection cycles.
    pub interval: u64,
    /// Root of the virtual process directory.
    pub proc_dir: String,
    /// Where the collected data is persisted.
    pub log_file: PathBuf,
    /// Also sample memory-mapped files of each process.
    pub collect_mapped: bool,
    /// Map-file targets under these prefixes are skipped.
    pub ignored_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interval: 2,
            proc_dir: "/proc".to_string(),
            log_file: default_log_path(),
            collect_mapped: false,
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "pkgwatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

pub fn default_log_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "pkgwatch")
        .map(|dirs| dirs.data_dir().join("usage.db"))
        .unwrap_or_else(|| PathBuf::from("usage.db"))
}
