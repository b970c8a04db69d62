//! Configuration management for LimeBox.
//!
//! This module defines the structure of the optional `limebox.toml` file and
//! merges it with command-line overrides into the [`Settings`] the app runs with.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "limebox.toml";
const DEFAULT_STORE_FILE: &str = "config.json";
const DEFAULT_MAX_LINES: usize = 10_000;
const DEFAULT_SHUTDOWN_SIGINT_MS: u64 = 800;
const DEFAULT_SHUTDOWN_SIGTERM_MS: u64 = 800;

/// Top-level configuration structure corresponding to `limebox.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Path of the JSON project registry.
    pub store: Option<PathBuf>,
    /// Directory GitHub projects are cloned into.
    pub clone_dir: Option<PathBuf>,
    /// Maximum number of log lines kept by the run view.
    pub max_lines: Option<usize>,
    /// Whether to use Unicode symbols in the TUI (default: true).
    pub symbols: Option<bool>,
    /// Time to wait after SIGINT before escalating (ms).
    pub shutdown_sigint_ms: Option<u64>,
    /// Time to wait after SIGTERM before force-killing (ms).
    pub shutdown_sigterm_ms: Option<u64>,
    /// Where diagnostic logs are written.
    pub log_file: Option<PathBuf>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// `limebox.toml` in the working directory, if there is one.
pub fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(CONFIG_FILE_NAME);
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store: Option<PathBuf>,
    pub max_lines: Option<usize>,
    pub shutdown_sigint_ms: Option<u64>,
    pub shutdown_sigterm_ms: Option<u64>,
}

/// Runtime configuration derived from CLI arguments and the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
    pub store_path: PathBuf,
    pub clone_dir: PathBuf,
    pub max_lines: usize,
    pub use_symbols: bool,
    pub shutdown_sigint_ms: u64,
    pub shutdown_sigterm_ms: u64,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(config: Config, config_path: Option<PathBuf>, overrides: Overrides) -> Self {
        let store_path = overrides
            .store
            .or(config.store)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE));
        let clone_dir = config.clone_dir.unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_path,
            store_path,
            clone_dir,
            max_lines: overrides
                .max_lines
                .or(config.max_lines)
                .unwrap_or(DEFAULT_MAX_LINES),
            use_symbols: config.symbols.unwrap_or(true),
            shutdown_sigint_ms: overrides
                .shutdown_sigint_ms
                .or(config.shutdown_sigint_ms)
                .unwrap_or(DEFAULT_SHUTDOWN_SIGINT_MS),
            shutdown_sigterm_ms: overrides
                .shutdown_sigterm_ms
                .or(config.shutdown_sigterm_ms)
                .unwrap_or(DEFAULT_SHUTDOWN_SIGTERM_MS),
            log_file: config.log_file.or_else(default_log_path),
        }
    }
}

/// Reads the config file (explicit path first, then `limebox.toml` in the working
/// directory) and applies `overrides`.
pub fn load_settings(
    explicit: Option<&Path>,
    no_config: bool,
    overrides: Overrides,
) -> Result<Settings> {
    let path = if no_config {
        None
    } else {
        explicit.map(Path::to_path_buf).or_else(default_config_path)
    };
    let config = match &path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    Ok(Settings::resolve(config, path, overrides))
}

fn default_log_path() -> Option<PathBuf> {
    state_dir().map(|dir| dir.join("limebox").join("limebox.log"))
}

fn state_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(path));
    }
    if cfg!(windows) {
        return env::var("LOCALAPPDATA").ok().map(PathBuf::from);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("state"))
}
