//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, which credential backend to use, clock skew allowance for local
//! expiry checks, the request timeout and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/campus-portal/config.json`.
//! `CAMPUS_API_URL`, `CAMPUS_CREDENTIAL_BACKEND` and `CAMPUS_CLOCK_SKEW_SECS`
//! override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::token::MAX_CLOCK_SKEW_SECS;

/// Application name used for config/data directory paths
const APP_NAME: &str = "campus-portal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend host plus the versioned API prefix.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/v1";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON file in the user data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

impl std::str::FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" => Ok(CredentialBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub credential_backend: CredentialBackend,
    pub clock_skew_secs: u64,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            credential_backend: CredentialBackend::default(),
            clock_skew_secs: 0,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.clamp();
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("CAMPUS_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(backend) = var("CAMPUS_CREDENTIAL_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring CAMPUS_CREDENTIAL_BACKEND"),
            }
        }
        if let Some(skew) = var("CAMPUS_CLOCK_SKEW_SECS") {
            match skew.trim().parse::<u64>() {
                Ok(skew) if skew <= MAX_CLOCK_SKEW_SECS => self.clock_skew_secs = skew,
                Ok(skew) => warn!(
                    skew,
                    max = MAX_CLOCK_SKEW_SECS,
                    "Ignoring CAMPUS_CLOCK_SKEW_SECS above the maximum"
                ),
                Err(e) => warn!(error = %e, "Ignoring CAMPUS_CLOCK_SKEW_SECS"),
            }
        }
    }

    /// Cap values read from the config file.
    fn clamp(&mut self) {
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            warn!(
                skew = self.clock_skew_secs,
                max = MAX_CLOCK_SKEW_SECS,
                "clock_skew_secs too large, capping"
            );
            self.clock_skew_secs = MAX_CLOCK_SKEW_SECS;
        }
    }

    /// Base URL without a trailing slash, so paths can be appended directly.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file credential backend
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
