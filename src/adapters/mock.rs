//! Scripted in-memory adapter.
//!
//! Used by the tests and by the CLI's `--dry-run` mode. Clones share state, so
//! a test can keep one handle while the connection owns another:
//!
//! ```
//! use labserial::adapters::MockAdapter;
//!
//! let mock = MockAdapter::new();
//! let handle = mock.clone();
//! handle.push_line("12.5");
//! assert!(mock.written().is_empty());
//! ```

use super::Adapter;
use crate::connection::ConnectionConfig;
use crate::error::{AppResult, DeviceError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long an empty read pretends to wait, like a real port's poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    refuse_connect: Option<String>,
    last_config: Option<ConnectionConfig>,
}

/// In-memory adapter; see the module docs.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Disconnected adapter with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue raw bytes for the device to "send".
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state().incoming.extend(bytes);
    }

    /// Queue one `"\r\n"` terminated response line.
    pub fn push_line(&self, line: &str) {
        self.push_bytes(line.as_bytes());
        self.push_bytes(crate::protocol::CRLF.as_bytes());
    }

    /// Make the next `connect` fail as if the port were claimed elsewhere.
    pub fn refuse_connect(&self, reason: &str) {
        self.state().refuse_connect = Some(reason.to_string());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    /// Written bytes split into `"\r\n"` terminated frames (terminator dropped).
    pub fn written_frames(&self) -> Vec<String> {
        let written = String::from_utf8_lossy(&self.written()).into_owned();
        written
            .split_terminator(crate::protocol::CRLF)
            .map(str::to_string)
            .collect()
    }

    /// Bytes queued but not read yet.
    pub fn pending(&self) -> usize {
        self.state().incoming.len()
    }

    /// Configuration passed to the last successful `connect`.
    pub fn last_config(&self) -> Option<ConnectionConfig> {
        self.state().last_config.clone()
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn connect(&mut self, config: &ConnectionConfig) -> AppResult<()> {
        let mut state = self.state();
        if let Some(reason) = state.refuse_connect.take() {
            return Err(DeviceError::transport(&config.port, reason));
        }
        state.connected = true;
        state.last_config = Some(config.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(DeviceError::NotConnected);
        }
        state.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        let mut state = self.state();
        if state.incoming.is_empty() {
            drop(state);
            std::thread::sleep(POLL_INTERVAL.min(timeout));
            return Err(std::io::ErrorKind::TimedOut.into());
        }
        let count = buffer.len().min(state.incoming.len());
        for (slot, byte) in buffer.iter_mut().zip(state.incoming.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn clear(&mut self) -> AppResult<()> {
        self.state().incoming.clear();
        Ok(())
    }
}
