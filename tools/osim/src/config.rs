//! `osim.toml` settings
//!
//! ```toml
//! [scheduler]
//! max_ticks = 1000
//!
//! [process]
//! first_pid = 100
//! wait_timeout_secs = 30.0
//!
//! [log]
//! level = "warn"
//! ```

use anyhow::{Context, Result};
use osim_proc::ProcConfig;
use osim_sched::SchedulerConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "osim.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub scheduler: SchedulerConfig,
    pub process: ProcConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `env_logger` filter used when neither `--log-level` nor `RUST_LOG` is set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

impl Settings {
    /// Load `explicit`, else `./osim.toml` if present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::source(explicit) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// File [`load`](Self::load) reads, `None` when defaults are used
    pub fn source(explicit: Option<&Path>) -> Option<&Path> {
        match explicit {
            Some(path) => Some(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Some(Path::new(DEFAULT_CONFIG_FILE)),
            None => None,
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
