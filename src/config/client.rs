use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::connection_string::ConnectionString;
use crate::errors::DbError;

pub const CONFIG_ENV: &str = "DOCWIRE_CONFIG";
pub const URI_ENV: &str = "DOCWIRE_URI";
const CONFIG_FILE: &str = "docwire.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
    pub retention: Option<usize>,
}

/// Client settings read from `docwire.toml`.
///
/// ```toml
/// uri = "mongodb://localhost:27017/test?querytimeout=10"
///
/// [logging]
/// level = "debug"
/// dir = "logs"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub uri: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// # Errors
    /// Returns `DbError::Toml` when the text is not a valid config.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load with precedence: explicit path > `DOCWIRE_CONFIG` > `~/.config/docwire.toml` >
    /// `./docwire.toml`; `DOCWIRE_URI` fills a missing `uri`.
    ///
    /// # Errors
    /// Returns an error if an existing config file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        let paths = config_search_paths(explicit);
        Self::load_from(&paths, std::env::var(URI_ENV).ok())
    }

    /// Merge the given files in order (earlier files win) and fall back to `env_uri`.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_from(paths: &[PathBuf], env_uri: Option<String>) -> Result<Self, DbError> {
        let mut cfg = Self::default();
        for p in paths.iter().filter(|p| p.exists()) {
            let file_cfg = Self::from_file(p)?;
            log::debug!("loaded client config from {}", p.display());
            cfg.merge_missing(file_cfg);
        }
        if cfg.uri.is_none() {
            cfg.uri = env_uri;
        }
        Ok(cfg)
    }

    fn merge_missing(&mut self, other: Self) {
        if self.uri.is_none() {
            self.uri = other.uri;
        }
        if self.logging.level.is_none() {
            self.logging.level = other.logging.level;
        }
        if self.logging.dir.is_none() {
            self.logging.dir = other.logging.dir;
        }
        if self.logging.retention.is_none() {
            self.logging.retention = other.logging.retention;
        }
    }

    /// # Errors
    /// `DbError::Configuration` when no `uri` is configured, or the parse error of the uri.
    pub fn connection_string(&self) -> Result<ConnectionString, DbError> {
        let uri = self
            .uri
            .as_deref()
            .ok_or_else(|| DbError::Configuration(format!("no uri configured (set it in {CONFIG_FILE} or {URI_ENV})")))?;
        ConnectionString::parse(uri)
    }
}

/// Candidate config files in precedence order.
#[must_use]
pub fn config_search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = explicit {
        paths.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join(CONFIG_FILE));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE));
    }
    paths
}
