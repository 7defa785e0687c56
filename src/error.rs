//! Custom error types for the serial control layer.
//!
//! `DeviceError` is the single error type returned by the library. It follows
//! the four failure classes the drivers can hit, plus a handful of supporting
//! variants for misuse and environment problems:
//!
//! - **`Transport`**: the port could not be claimed (busy, bad path, permission
//!   denied) or a write failed. Fatal to the current connection attempt; the
//!   user has to intervene before retrying.
//! - **`Timeout`**: a query got no terminated line within the configured window.
//!   The connection stays open and the caller may simply try again.
//! - **`Config`**: a command catalog source is malformed or incomplete. The
//!   previously loaded catalog, if any, stays in use.
//! - **`CommandNotFound`**: the resolver has no entry for the selected
//!   parameters. A user-facing warning; nothing changes state.
//!
//! By using `#[from]`, lower level errors convert with the `?` operator.

use crate::resolver::ResolutionQuery;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type AppResult<T> = std::result::Result<T, DeviceError>;

/// Errors returned by the serial control layer.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Port could not be claimed, or an I/O fault hit an open port.
    #[error("Transport error on '{port}': {reason}")]
    Transport {
        /// Port path, or a pseudo name when no single port is involved
        port: String,
        /// Underlying cause as reported by the OS or driver
        reason: String,
    },

    /// No terminated line arrived within the configured window.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Malformed or incomplete catalog or settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The catalog has no entry for this selection.
    #[error("Command not found for {0}")]
    CommandNotFound(ResolutionQuery),

    /// I/O attempted on a closed connection.
    #[error("Serial port not connected")]
    NotConnected,

    /// Command text contains the frame delimiter.
    #[error("Invalid command {0:?}: commands must not contain the frame delimiter")]
    InvalidCommand(String),

    /// Reply could not be decoded or parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Settings file or environment could not be extracted.
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// Filesystem or OS error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Built without the `instrument_serial` feature.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

impl DeviceError {
    pub(crate) fn transport(port: &str, reason: impl ToString) -> Self {
        DeviceError::Transport {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller can carry on without user intervention.
    ///
    /// Timeouts leave the connection open and an unmatched resolution changes
    /// nothing, so both can be retried or reported as warnings. Everything else
    /// needs the user to fix a port, a file or the build.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeviceError::Timeout(_) | DeviceError::CommandNotFound(_)
        )
    }
}

impl From<figment::Error> for DeviceError {
    fn from(err: figment::Error) -> Self {
        DeviceError::Settings(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::transport("/dev/ttyACM0", "Device or resource busy");
        assert_eq!(
            err.to_string(),
            "Transport error on '/dev/ttyACM0': Device or resource busy"
        );
    }

    #[test]
    fn test_command_not_found_display() {
        let err = DeviceError::CommandNotFound(ResolutionQuery::for_dynamic("50", "20"));
        assert_eq!(
            err.to_string(),
            "Command not found for dynamic voltage=50 frequency=20"
        );
    }

    #[test]
    fn test_recoverable_classes() {
        assert!(DeviceError::Timeout(Duration::from_millis(100)).is_recoverable());
        assert!(DeviceError::CommandNotFound(ResolutionQuery::for_static("100")).is_recoverable());
        assert!(!DeviceError::Config("missing 'stop'".into()).is_recoverable());
        assert!(!DeviceError::transport("COM3", "Access is denied").is_recoverable());
        assert!(!DeviceError::NotConnected.is_recoverable());
    }
}
