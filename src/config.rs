//! Service configuration: named destination directories.
//!
//! Loaded from `~/.fetchd/config.json`. A missing file yields defaults; a
//! present but unreadable file is an error so a typo never silently sends
//! downloads to the wrong place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Destination key used when a request names none.
pub const DEFAULT_DESTINATION: &str = "downloads";

fn default_destination_key() -> String {
    DEFAULT_DESTINATION.to_string()
}

/// Persistent service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named destination directories a request may select by key.
    pub destinations: HashMap<String, PathBuf>,
    /// Destination key used when a request names neither a destination
    /// nor a custom path.
    #[serde(default = "default_destination_key")]
    pub default_destination: String,
}

impl Default for Config {
    fn default() -> Self {
        let downloads = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("downloads"));

        let mut destinations = HashMap::new();
        destinations.insert(DEFAULT_DESTINATION.to_string(), downloads);
        Self {
            destinations,
            default_destination: default_destination_key(),
        }
    }
}

impl Config {
    /// The config file path, `~/.fetchd/config.json`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".fetchd").join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".fetchd/config.json"))
    }

    /// Load the config from disk, falling back to defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Write the config to disk, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_downloads_destination() {
        let config = Config::default();
        assert!(config.destinations.contains_key(DEFAULT_DESTINATION));
        assert_eq!(config.default_destination, DEFAULT_DESTINATION);
    }

    #[test]
    fn test_default_destination_key_filled_when_absent_from_file() {
        let json = r#"{ "destinations": { "models": "/data/models" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.default_destination, DEFAULT_DESTINATION);
    }

    #[test]
    fn test_save_and_load_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config
            .destinations
            .insert("models".to_string(), PathBuf::from("/data/models"));
        config.default_destination = "models".to_string();
        config.save_to(&path).expect("save config");

        let loaded = Config::load_from(&path).expect("load config");
        assert_eq!(loaded.default_destination, "models");
        assert_eq!(
            loaded.destinations.get("models"),
            Some(&PathBuf::from("/data/models"))
        );
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("absent.json")).expect("load defaults");
        assert!(config.destinations.contains_key(DEFAULT_DESTINATION));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let mut config = Config::default();
        config
            .destinations
            .insert("models".to_string(), PathBuf::from("/data/models"));

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.destinations.get("models"),
            Some(&PathBuf::from("/data/models"))
        );
    }
}
