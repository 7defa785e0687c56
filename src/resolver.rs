//! Maps the user's selection to a literal command from the catalog.
//!
//! Resolution scans the relevant list in order and returns the first entry
//! whose key fields are textually equal to the query. There is no numeric
//! coercion: `"100"` and `"100.0"` are different voltages.

use crate::catalog::CommandCatalog;
use crate::error::{AppResult, DeviceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Operating mode of the high-voltage supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Command selected by voltage alone
    Static,
    /// Command selected by voltage and frequency
    Dynamic,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Static => write!(f, "static"),
            Mode::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A selection to resolve. `frequency` is only meaningful in dynamic mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionQuery {
    /// Which catalog list to search
    pub mode: Mode,
    /// Voltage as shown to the user
    pub voltage: String,
    /// Frequency as shown to the user; `None` in static mode
    pub frequency: Option<String>,
}

impl ResolutionQuery {
    /// Static-mode query.
    pub fn for_static(voltage: impl Into<String>) -> Self {
        Self {
            mode: Mode::Static,
            voltage: voltage.into(),
            frequency: None,
        }
    }

    /// Dynamic-mode query.
    pub fn for_dynamic(voltage: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            mode: Mode::Dynamic,
            voltage: voltage.into(),
            frequency: Some(frequency.into()),
        }
    }
}

impl fmt::Display for ResolutionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} voltage={}", self.mode, self.voltage)?;
        match (self.mode, &self.frequency) {
            (Mode::Static, _) => Ok(()),
            (Mode::Dynamic, Some(frequency)) => write!(f, " frequency={}", frequency),
            (Mode::Dynamic, None) => write!(f, " frequency=<none>"),
        }
    }
}

/// Find the command for `query`; the first matching entry wins.
pub fn resolve<'a>(catalog: &'a CommandCatalog, query: &ResolutionQuery) -> AppResult<&'a str> {
    let found = match query.mode {
        Mode::Static => catalog
            .static_entries()
            .iter()
            .find(|entry| entry.voltage == query.voltage)
            .map(|entry| entry.command.as_str()),
        Mode::Dynamic => query.frequency.as_deref().and_then(|frequency| {
            catalog
                .dynamic_entries()
                .iter()
                .find(|entry| entry.voltage == query.voltage && entry.frequency == frequency)
                .map(|entry| entry.command.as_str())
        }),
    };

    match found {
        Some(command) => {
            debug!("Resolved {} to '{}'", query, command);
            Ok(command)
        }
        None => {
            warn!("Command not found for {}", query);
            Err(DeviceError::CommandNotFound(query.clone()))
        }
    }
}

/// Owned-result convenience wrapper over [`resolve`].
pub fn resolve_command(
    catalog: &CommandCatalog,
    mode: Mode,
    voltage: &str,
    frequency: Option<&str>,
) -> AppResult<String> {
    let query = ResolutionQuery {
        mode,
        voltage: voltage.to_string(),
        frequency: frequency.map(str::to_string),
    };
    resolve(catalog, &query).map(str::to_string)
}
