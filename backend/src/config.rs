//! # Configuration
//!
//! Runtime settings loaded from a YAML file. Every field has a default, so a
//! missing file or a partial file are both fine.
//!
//! ```yaml
//! data_directory: "/var/lib/rental-ledger"
//! log_level: "info"
//! identifier_domain: "knowapp.com"
//! validation:
//!   max_name_length: 256
//! auth:
//!   min_secret_length: 6
//! rollover:
//!   enabled: true
//!   catch_up_on_start: true
//! ```
//!
//! `RENTAL_LEDGER_DATA_DIR` and `RENTAL_LEDGER_LOG` override the file.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "RENTAL_LEDGER_DATA_DIR";
pub const LOG_LEVEL_ENV: &str = "RENTAL_LEDGER_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the CSV document store
    pub data_directory: PathBuf,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Domain appended to usernames to form auth identifiers
    pub identifier_domain: String,
    pub validation: ValidationConfig,
    pub auth: AuthConfig,
    pub rollover: RolloverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_name_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub min_secret_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    /// Run the midnight archive task for signed-in sessions
    pub enabled: bool,
    /// Archive the previous day when the task starts, covering restarts
    /// across midnight
    pub catch_up_on_start: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            log_level: "info".to_string(),
            identifier_domain: "knowapp.com".to_string(),
            validation: ValidationConfig::default(),
            auth: AuthConfig::default(),
            rollover: RolloverConfig::default(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_name_length: 256,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_secret_length: 6,
        }
    }
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            catch_up_on_start: true,
        }
    }
}

fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("Rental Ledger"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

impl LedgerConfig {
    /// Load from a YAML file, failing if it cannot be read or parsed
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config: LedgerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
        info!("Loaded configuration from {:?}", config_path);
        Ok(config.with_env_overrides())
    }

    /// Load from a YAML file, falling back to defaults when that fails
    pub fn load_or_default(config_path: &Path) -> Self {
        match Self::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}", e);
                info!("Using default configuration");
                Self::default().with_env_overrides()
            }
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(DATA_DIR_ENV).ok(),
            std::env::var(LOG_LEVEL_ENV).ok(),
        )
    }

    fn with_overrides(mut self, data_directory: Option<String>, log_level: Option<String>) -> Self {
        if let Some(dir) = data_directory.filter(|dir| !dir.trim().is_empty()) {
            self.data_directory = PathBuf::from(dir);
        }
        if let Some(level) = log_level.filter(|level| !level.trim().is_empty()) {
            self.log_level = level;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(
            &path,
            "data_directory: /srv/ledger\nrollover:\n  catch_up_on_start: false\n",
        )
        .unwrap();

        let config = LedgerConfig::load(&path).unwrap();
        assert!(!config.rollover.catch_up_on_start);
        assert!(config.rollover.enabled);
        assert_eq!(config.validation.max_name_length, 256);
        assert_eq!(config.identifier_domain, "knowapp.com");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.yaml");
        fs::write(&path, "validation: [not, a, map]\n").unwrap();

        assert!(LedgerConfig::load(&path).is_err());
        assert!(LedgerConfig::load(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = LedgerConfig::default().with_overrides(
            Some("/tmp/ledger-data".to_string()),
            Some("debug".to_string()),
        );
        assert_eq!(config.data_directory, PathBuf::from("/tmp/ledger-data"));
        assert_eq!(config.log_level, "debug");

        let untouched = LedgerConfig::default().with_overrides(Some("  ".to_string()), None);
        assert_eq!(untouched.log_level, "info");
    }
}
