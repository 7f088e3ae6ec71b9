//! Configuration management for the Energiinfo client
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{EnergiinfoError, Result};
use crate::meter::PeriodRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

pub use defaults::{DEFAULT_BASE_URL, MAX_POLL_INTERVAL_SECS};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metering API endpoint configuration
    pub api: ApiConfig,

    /// Account and meter identifiers
    pub meter: MeterConfig,

    /// Period data request sent on every poll
    pub period: PeriodRequest,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Seconds between period data polls
    pub poll_interval_secs: u64,
}

/// Metering API endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every command is sent to
    pub base_url: String,

    /// Bound on a single request, in seconds
    pub timeout_secs: u64,
}

/// Account credentials and meter identifiers
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MeterConfig {
    pub username: String,
    pub password: String,
    pub site_id: String,
    pub meter_id: String,

    /// Previously issued permanent token; skips the login request when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for MeterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .field("site_id", &self.site_id)
            .field("meter_id", &self.meter_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory); empty disables file logging
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("ENERGIINFO_CONFIG")
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        let default_paths = [
            "energiinfo.yaml",
            "/data/energiinfo.yaml",
            "/etc/energiinfo/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Override credentials from `ENERGIINFO_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override credentials from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 4] = [
            ("ENERGIINFO_USERNAME", &mut self.meter.username),
            ("ENERGIINFO_PASSWORD", &mut self.meter.password),
            ("ENERGIINFO_SITE_ID", &mut self.meter.site_id),
            ("ENERGIINFO_METER_ID", &mut self.meter.meter_id),
        ];
        for (key, slot) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(EnergiinfoError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(EnergiinfoError::validation(
                "api.base_url",
                "Base URL must be http(s)",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(EnergiinfoError::validation(
                "api.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.meter.meter_id.trim().is_empty() {
            return Err(EnergiinfoError::validation(
                "meter.meter_id",
                "Meter ID cannot be empty",
            ));
        }

        // A seeded token makes the login credentials optional
        if self.meter.access_token.as_deref().is_none_or(str::is_empty) {
            if self.meter.username.is_empty() {
                return Err(EnergiinfoError::validation(
                    "meter.username",
                    "Username required when no access token is configured",
                ));
            }
            if self.meter.site_id.is_empty() {
                return Err(EnergiinfoError::validation(
                    "meter.site_id",
                    "Site ID required when no access token is configured",
                ));
            }
        }

        if self.period.signal.trim().is_empty() {
            return Err(EnergiinfoError::validation(
                "period.signal",
                "Signal cannot be empty",
            ));
        }

        if self.period.count == 0 {
            return Err(EnergiinfoError::validation(
                "period.count",
                "Must be greater than 0",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(EnergiinfoError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(EnergiinfoError::validation(
                "poll_interval_secs".to_string(),
                format!("Must be at most {} seconds", MAX_POLL_INTERVAL_SECS),
            ));
        }

        Ok(())
    }
}
