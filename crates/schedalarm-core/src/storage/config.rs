//! TOML-based application configuration.
//!
//! Stored at `~/.config/schedalarm/config.toml`. Embedders that never call
//! `save()` run entirely on defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/schedalarm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Override for the database file location. Defaults to
    /// `schedalarm.db` inside the data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// How long the watch loop sleeps when no schedule has an upcoming
    /// event, in seconds.
    #[serde(default = "default_fallback_poll_secs")]
    pub fallback_poll_secs: u64,
}

fn default_fallback_poll_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            fallback_poll_secs: default_fallback_poll_secs(),
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf, std::io::Error> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default() -> Self {
        let Ok(path) = Self::config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist the configuration.
    ///
    /// # Errors
    /// Returns an error if the data directory or file cannot be written.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)
    }

    /// The database path to open: the override if set, otherwise the
    /// default location in the data directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf, std::io::Error> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("schedalarm.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.db_path.is_none());
        assert_eq!(config.fallback_poll_secs, 300);
    }

    #[test]
    fn toml_round_trip() {
        let mut config = Config::default();
        config.db_path = Some(PathBuf::from("/tmp/test.db"));
        config.fallback_poll_secs = 60;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let decoded: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(decoded.db_path, config.db_path);
        assert_eq!(decoded.fallback_poll_secs, 60);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let decoded: Config = toml::from_str("").unwrap();
        assert_eq!(decoded.fallback_poll_secs, 300);
    }
}
