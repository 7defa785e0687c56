//! Application settings using Figment
//!
//! Settings are layered, lowest precedence first:
//! 1. Built-in defaults (device profiles, embedded command catalog)
//! 2. TOML file (default: `config/labserial.toml`, optional)
//! 3. Environment variables prefixed with `LABSERIAL_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! LABSERIAL_APPLICATION__LOG_LEVEL=debug
//! LABSERIAL_HIGH_VOLTAGE__BAUD_RATE=19200
//! LABSERIAL_LOADCELL__TIMEOUT=250ms
//! LABSERIAL_CATALOG__USER_PATH=/home/lab/commands.json
//! ```
//!
//! # Example file
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [catalog]
//! user_path = "my_commands.json"
//!
//! [high_voltage]
//! port_filter = "Arduino"
//! baud_rate = 9600
//! timeout = "100ms"
//! ```

use crate::catalog::{load_catalog, load_user_catalog, CommandCatalog};
use crate::connection::ConnectionConfig;
use crate::error::{AppResult, DeviceError};
use crate::instrument::{DeviceProfile, HIGH_VOLTAGE_PROFILE, LOADCELL_PROFILE, SUPPORTED_BAUD_RATES};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file location, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "config/labserial.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "LABSERIAL_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Reject a baud rate outside [`SUPPORTED_BAUD_RATES`].
pub fn check_baud_rate(baud_rate: u32) -> AppResult<()> {
    if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
        Ok(())
    } else {
        Err(DeviceError::Config(unsupported_baud_rate(baud_rate)))
    }
}

fn unsupported_baud_rate(baud_rate: u32) -> String {
    format!(
        "unsupported baud_rate {}. Must be one of: {:?}",
        baud_rate, SUPPORTED_BAUD_RATES
    )
}

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// `[application]`
    pub application: ApplicationConfig,
    /// `[catalog]`
    pub catalog: CatalogConfig,
    /// `[high_voltage]`
    pub high_voltage: DeviceSettings,
    /// `[loadcell]`
    pub loadcell: DeviceSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Where command catalogs come from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Default command file; the embedded catalog when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_path: Option<PathBuf>,
    /// User overlay replacing whole `static` / `dynamic` / `stop` keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_path: Option<PathBuf>,
}

/// Per-device serial settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Substring a port description must contain to be listed
    #[serde(default)]
    pub port_filter: String,
    /// One of [`SUPPORTED_BAUD_RATES`]
    pub baud_rate: u32,
    /// Read timeout applied when the port is opened
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl DeviceSettings {
    /// The profile's built-in defaults.
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        Self {
            port_filter: profile.port_filter.to_string(),
            baud_rate: profile.default_baud_rate,
            timeout: profile.default_timeout,
        }
    }

    /// Connection settings for `port`.
    pub fn connection_config(&self, port: impl Into<String>) -> ConnectionConfig {
        ConnectionConfig::new(port, self.baud_rate).with_timeout(self.timeout)
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            catalog: CatalogConfig::default(),
            high_voltage: DeviceSettings::from_profile(&HIGH_VOLTAGE_PROFILE),
            loadcell: DeviceSettings::from_profile(&LOADCELL_PROFILE),
        }
    }
}

impl Settings {
    /// Load from [`DEFAULT_SETTINGS_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_SETTINGS_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Checks log level, baud rates and timeouts.
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(DeviceError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        for (name, device) in [("high_voltage", &self.high_voltage), ("loadcell", &self.loadcell)] {
            if !SUPPORTED_BAUD_RATES.contains(&device.baud_rate) {
                return Err(DeviceError::Config(format!(
                    "{}: {}",
                    name,
                    unsupported_baud_rate(device.baud_rate)
                )));
            }
            if device.timeout.is_zero() {
                return Err(DeviceError::Config(format!(
                    "{}: timeout must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Load the command catalog these settings point at.
    pub fn load_catalog(&self) -> AppResult<CommandCatalog> {
        let user_path = self.catalog.user_path.as_deref();
        match &self.catalog.default_path {
            Some(default_path) => load_catalog(default_path, user_path),
            None => load_user_catalog(user_path),
        }
    }

    /// Render as TOML, e.g. to seed a settings file.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DeviceError::Config(format!("cannot render settings: {}", e)))
    }
}
