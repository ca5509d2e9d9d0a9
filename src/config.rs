use clap::ValueEnum;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_KEY_PREFIX: &str = "composerData:";
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;

/// What the first successful poll does with conversations that already exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMode {
    /// Record existing conversations as seen; only later growth is printed.
    #[default]
    SkipExisting,
    /// Print every existing conversation on the first poll.
    EmitExisting,
}

impl BootstrapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapMode::SkipExisting => "skip-existing",
            BootstrapMode::EmitExisting => "emit-existing",
        }
    }
}

/// Settings for the poll loop.
/// This decouples the loop from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    pub key_prefix: String,
    pub poll_interval: Duration,
    pub bootstrap_mode: BootstrapMode,
    pub debug_logging: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            bootstrap_mode: BootstrapMode::default(),
            debug_logging: false,
        }
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Deserialize, Default, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub table: Option<String>,
    pub key_prefix: Option<String>,
    pub poll_interval_secs: Option<f64>,
    pub bootstrap: Option<BootstrapMode>,
    pub output: Option<PathBuf>,
    pub debug: Option<bool>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cursor-chat-monitor/config.toml"))
}

/// Where Cursor keeps its global state database on this platform.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Cursor/User/globalStorage/state.vscdb"))
}

pub fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        default_config_path().filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            parse_file_config(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

pub fn parse_file_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

pub fn poll_interval(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(eyre!(
            "Poll interval must be a positive number of seconds, got {}",
            secs
        ));
    }
    Duration::try_from_secs_f64(secs).wrap_err("Poll interval out of range")
}
