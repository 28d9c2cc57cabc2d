//! Configuration file loading and environment resolution.
//!
//! A TOML file in the platform config directory supplies defaults; the
//! `SERVING_*` and `TELEMETRY_*` environment variables override it, and
//! command-line flags override both.

use std::env;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::core::history::HistoryStore;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub endpoint: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub history_file: Option<PathBuf>,
    pub telemetry_url: Option<String>,
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "parley", "parley")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads the config file if one exists; no file is an empty config.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

const MISSING_ENDPOINT: &str = "Unable to determine which serving endpoint to chat with.

Set the SERVING_ENDPOINT environment variable to the name of your serving
endpoint, pass --endpoint, or add `endpoint = \"...\"` to the config file.";

const MISSING_BASE_URL: &str = "Unable to determine the serving workspace URL.

Set the SERVING_BASE_URL environment variable to your workspace's base URL,
pass --base-url, or add `base_url = \"...\"` to the config file.";

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub history_file: Option<PathBuf>,
    pub telemetry_url: Option<String>,
}

impl Settings {
    pub fn resolve(
        config: Config,
        endpoint_flag: Option<String>,
        base_url_flag: Option<String>,
        no_telemetry: bool,
    ) -> Result<Self, Box<dyn StdError>> {
        let endpoint = endpoint_flag
            .or_else(|| env_var("SERVING_ENDPOINT"))
            .or(config.endpoint)
            .ok_or(MISSING_ENDPOINT)?;
        let base_url = base_url_flag
            .or_else(|| env_var("SERVING_BASE_URL"))
            .or(config.base_url)
            .ok_or(MISSING_BASE_URL)?;
        let api_key = env_var("SERVING_API_KEY").or(config.api_key);
        let history_file = config.history_file.or_else(HistoryStore::default_path);
        let telemetry_url = if no_telemetry {
            None
        } else {
            env_var("TELEMETRY_INGEST_URL").or(config.telemetry_url)
        };

        Ok(Settings {
            endpoint,
            base_url,
            api_key,
            history_file,
            telemetry_url,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
