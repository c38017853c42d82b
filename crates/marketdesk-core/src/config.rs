//! Application configuration management.
//!
//! This module handles loading and saving the console configuration: backend
//! URL, where the session is stored, token lifetimes and the last identifier
//! used to log in.
//!
//! Configuration is stored at `~/.config/marketdesk/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::auth::session::MAX_TOKEN_TTL_DAYS;
use crate::auth::{FileStore, KeyringStore, MemoryStore, SecretStore, SessionSettings};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "marketdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Upper bound for the refresh buffer and check interval (one day)
const MAX_DURATION_SECS: u64 = 86_400;

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "MARKETDESK_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub session_ttl_hours: i64,
    pub refresh_buffer_secs: i64,
    pub expiry_check_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub page_size: u32,
    pub log_to_file: bool,
    pub last_identifier: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            session_ttl_hours: crate::auth::session::DEFAULT_TOKEN_TTL_HOURS,
            refresh_buffer_secs: crate::auth::expiry::TOKEN_REFRESH_BUFFER_MINUTES * 60,
            expiry_check_interval_secs: crate::auth::manager::DEFAULT_CHECK_INTERVAL_SECS,
            request_timeout_secs: crate::api::client::REQUEST_TIMEOUT_SECS,
            page_size: 20,
            log_to_file: false,
            last_identifier: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Backend for the credential store, as configured.
    pub fn secret_store(&self) -> Result<Arc<dyn SecretStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(&self.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        })
    }

    /// Session timing, with out-of-range values clamped.
    pub fn session_settings(&self) -> SessionSettings {
        let ttl_hours = self.session_ttl_hours.clamp(1, MAX_TOKEN_TTL_DAYS * 24);
        let buffer_secs = self.refresh_buffer_secs.clamp(0, MAX_DURATION_SECS as i64);
        SessionSettings {
            default_ttl: Duration::hours(ttl_hours),
            refresh_buffer: Duration::seconds(buffer_secs),
            ..SessionSettings::default()
        }
    }

    pub fn check_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.expiry_check_interval_secs.clamp(1, MAX_DURATION_SECS))
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_secs.max(1))
    }
}
