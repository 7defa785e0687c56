//! Hardware adapter implementations
//!
//! An adapter is the raw byte transport underneath a [`Connection`]: it claims
//! the OS handle, moves bytes, and nothing else. Framing, state tracking and
//! read timeouts live in the connection so every adapter behaves the same.
//!
//! [`Connection`]: crate::connection::Connection

pub mod mock;
pub mod serial_adapter;

pub use mock::MockAdapter;
pub use serial_adapter::SerialAdapter;

use crate::connection::ConnectionConfig;
use crate::error::AppResult;
use std::time::Duration;

/// Blocking byte transport for one instrument.
pub trait Adapter: Send {
    /// Short name used in logs ("serial", "mock").
    fn name(&self) -> &str;

    /// Claim the handle described by `config`.
    ///
    /// Fails with [`DeviceError::Transport`](crate::error::DeviceError::Transport)
    /// when the port is busy, missing or not accessible.
    fn connect(&mut self, config: &ConnectionConfig) -> AppResult<()>;

    /// Release the handle. Must tolerate being called when not connected.
    fn disconnect(&mut self);

    /// Whether a handle is currently claimed.
    fn is_connected(&self) -> bool;

    /// Write all bytes and flush.
    fn write(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Read whatever is available into `buffer`, blocking for at most `timeout`.
    ///
    /// Returns `ErrorKind::TimedOut` when nothing arrived in that window. The
    /// connection passes the time left until its own deadline, so an adapter
    /// must never block past it.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize>;

    /// Discard pending input and output bytes.
    fn clear(&mut self) -> AppResult<()>;
}
