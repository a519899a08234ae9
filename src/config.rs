use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{FdepError, Result};

/// Default name of the configuration file, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "fdep-mcp.toml";

/// Log levels accepted by `LOG_LEVEL` / `log_level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the fdep MCP server.
///
/// Loaded from an optional TOML file and then overridden by environment
/// variables (see [`apply_env_overrides`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path of the SQLite database holding the extracted code facts.
    pub db_path: PathBuf,
    /// Directory of raw fdep dumps the database was imported from.
    pub fdep_path: Option<PathBuf>,
    /// Tracing level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Optional log file; logs go to stderr otherwise.
    pub log_file: Option<PathBuf>,
    pub dev_mode: bool,
    /// Upper bound for every result limit and table scan.
    pub max_results: usize,
    /// Upper bound for every graph traversal depth.
    pub max_depth: usize,
    /// Tool responses longer than this are truncated.
    pub max_response_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("fdep.db"),
            fdep_path: None,
            log_level: "info".to_string(),
            log_file: None,
            dev_mode: false,
            max_results: 1000,
            max_depth: 10,
            max_response_chars: 15_000,
        }
    }
}

impl ServerConfig {
    /// Checks the configuration and returns every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(ref fdep_path) = self.fdep_path {
            if !fdep_path.exists() {
                errors.push(format!(
                    "FDEP_PATH does not exist: {}",
                    fdep_path.display()
                ));
            } else if !fdep_path.is_dir() {
                errors.push(format!(
                    "FDEP_PATH is not a directory: {}",
                    fdep_path.display()
                ));
            }
        }

        let level = self.log_level.to_ascii_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!(
                "invalid log level '{}': must be one of {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if self.max_results == 0 {
            errors.push("max_results must be greater than zero".to_string());
        }
        if self.max_depth == 0 {
            errors.push("max_depth must be greater than zero".to_string());
        }
        if self.max_response_chars == 0 {
            errors.push("max_response_chars must be greater than zero".to_string());
        }

        errors
    }
}

/// Loads the configuration.
///
/// Reads `path` (or [`CONFIG_FILENAME`] in the working directory when `path`
/// is `None`) if it exists, then applies environment variable overrides.
/// An explicitly given path that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default_path = Path::new(CONFIG_FILENAME);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                ServerConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ServerConfig> {
    let contents = fs::read_to_string(path).map_err(|e| FdepError::Config {
        message: format!("failed to read config file '{}': {}", path.display(), e),
    })?;

    toml::from_str(&contents).map_err(|e| FdepError::Config {
        message: format!("failed to parse config file '{}': {}", path.display(), e),
    })
}

/// Overrides configuration fields from environment variables.
///
/// `lookup` abstracts the environment so callers can supply their own source.
/// Recognised keys: `FDEP_DB_PATH`, `FDEP_PATH`, `LOG_LEVEL`, `LOG_FILE`,
/// `DEV_MODE`, `FDEP_MAX_RESULTS`, `FDEP_MAX_DEPTH`.
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("FDEP_DB_PATH") {
        config.db_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("FDEP_PATH") {
        config.fdep_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.log_level = v.to_ascii_lowercase();
    }
    if let Some(v) = lookup("LOG_FILE") {
        config.log_file = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("DEV_MODE") {
        config.dev_mode = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = lookup("FDEP_MAX_RESULTS") {
        config.max_results = parse_bound("FDEP_MAX_RESULTS", &v)?;
    }
    if let Some(v) = lookup("FDEP_MAX_DEPTH") {
        config.max_depth = parse_bound("FDEP_MAX_DEPTH", &v)?;
    }
    Ok(())
}

fn parse_bound(key: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|e| FdepError::Config {
        message: format!("invalid {key} '{value}': {e}"),
    })
}

/// Saves the configuration as TOML using an atomic write.
///
/// Writes to a temporary file first and then renames it into place.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| FdepError::Config {
                message: format!(
                    "failed to create config directory '{}': {}",
                    parent.display(),
                    e
                ),
            })?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    let contents = toml::to_string_pretty(config).map_err(|e| FdepError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;

    fs::write(&tmp_path, &contents).map_err(|e| FdepError::Config {
        message: format!(
            "failed to write temporary config file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, path).map_err(|e| FdepError::Config {
        message: format!(
            "failed to rename temporary config file '{}' to '{}': {}",
            tmp_path.display(),
            path.display(),
            e
        ),
    })?;

    Ok(())
}
