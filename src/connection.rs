//! Connection lifecycle for one instrument session.
//!
//! A [`Connection`] owns an [`Adapter`] exclusively and moves between
//! [`ConnectionState::Closed`] and [`ConnectionState::Open`] only through
//! [`Connection::open`] and [`Connection::close`]. All I/O is blocking; a
//! query blocks the calling thread for at most the configured timeout.
//!
//! The timeout in effect when `open()` is called governs every read until the
//! connection is closed again.

use crate::adapters::{Adapter, SerialAdapter};
use crate::error::{AppResult, DeviceError};
use crate::protocol::LineFramer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Operational read timeout applied at `open()` by both instruments.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Port settings for one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port path or identifier (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate (e.g., 9600)
    pub baud_rate: u32,
    /// Read timeout for queries
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Settings with [`DEFAULT_TIMEOUT`].
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No handle held
    #[default]
    Closed,
    /// Port claimed; I/O allowed
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Open => write!(f, "open"),
        }
    }
}

/// Framed request/response channel over an [`Adapter`].
#[derive(Debug)]
pub struct Connection<A: Adapter = SerialAdapter> {
    adapter: A,
    framer: LineFramer,
    config: ConnectionConfig,
    state: ConnectionState,
}

impl Connection<SerialAdapter> {
    /// Serial connection with `"\r\n"` framing.
    pub fn serial(config: ConnectionConfig) -> Self {
        Self::new(SerialAdapter::new(), LineFramer::crlf(), config)
    }
}

impl<A: Adapter> Connection<A> {
    /// A closed connection; nothing is claimed until [`open`](Self::open).
    pub fn new(adapter: A, framer: LineFramer, config: ConnectionConfig) -> Self {
        Self {
            adapter,
            framer,
            config,
            state: ConnectionState::Closed,
        }
    }

    /// Settings applied at the next `open()`.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Mutable settings. Changes take effect at the next `open()`.
    pub fn config_mut(&mut self) -> &mut ConnectionConfig {
        &mut self.config
    }

    /// Line framer in use.
    pub fn framer(&self) -> &LineFramer {
        &self.framer
    }

    /// Underlying byte transport.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the port is claimed.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Claim the port. Does not probe the device.
    pub fn open(&mut self) -> AppResult<()> {
        if self.is_open() {
            warn!("Port '{}' is already open", self.config.port);
            return Ok(());
        }
        self.adapter.connect(&self.config)?;
        self.state = ConnectionState::Open;
        info!(
            "Opened '{}' via {} adapter at {} baud (timeout {:?})",
            self.config.port,
            self.adapter.name(),
            self.config.baud_rate,
            self.config.timeout
        );
        Ok(())
    }

    /// Release the port. Closing a closed connection is a no-op.
    pub fn close(&mut self) {
        if !self.is_open() {
            debug!("Port '{}' already closed", self.config.port);
            return;
        }
        self.adapter.disconnect();
        self.state = ConnectionState::Closed;
        info!("Closed '{}'", self.config.port);
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// Write one framed command and return without waiting for a reply.
    pub fn send(&mut self, command: &str) -> AppResult<()> {
        self.ensure_open()?;
        let frame = self.framer.encode(command)?;
        self.adapter.write(&frame)?;
        debug!("[{}] Sent command: {}", self.config.port, command);
        Ok(())
    }

    /// Read one framed line and decode it.
    pub fn receive(&mut self) -> AppResult<String> {
        self.ensure_open()?;
        let line = self.read_line()?;
        let response = self.framer.decode(&line)?;
        debug!("[{}] Received response: {}", self.config.port, response);
        Ok(response)
    }

    /// Send a command, then block for one response line.
    ///
    /// Returns [`DeviceError::Timeout`] if no terminated line arrives in time;
    /// partial data is discarded, never returned.
    pub fn query(&mut self, command: &str) -> AppResult<String> {
        self.send(command)?;
        self.receive()
    }

    /// Discard pending input and output bytes.
    pub fn reset_buffers(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.adapter.clear()
    }

    fn read_line(&mut self) -> AppResult<Vec<u8>> {
        let timeout = self.config.timeout;
        let delimiter = self.framer.delimiter_bytes();
        let deadline = Instant::now() + timeout;
        let mut line: Vec<u8> = Vec::new();
        let mut buffer = [0u8; 1];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.drop_partial(&line, timeout));
            }

            match self.adapter.read(&mut buffer, remaining) {
                Ok(0) => {
                    return Err(DeviceError::transport(
                        &self.config.port,
                        "unexpected EOF",
                    ));
                }
                Ok(_) => {
                    line.push(buffer[0]);
                    if line.ends_with(delimiter) {
                        // A terminator that shows up after the window does not count
                        if Instant::now() > deadline {
                            return Err(self.drop_partial(&line, timeout));
                        }
                        return Ok(line);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(DeviceError::transport(&self.config.port, e)),
            }
        }
    }

    fn drop_partial(&self, line: &[u8], timeout: Duration) -> DeviceError {
        if !line.is_empty() {
            warn!(
                "[{}] Dropping {} bytes of late or unterminated response",
                self.config.port,
                line.len()
            );
        }
        DeviceError::Timeout(timeout)
    }
}

impl<A: Adapter> Drop for Connection<A> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockAdapter;
    use tracing_test::traced_test;

    fn mock_connection(timeout: Duration) -> (Connection<MockAdapter>, MockAdapter) {
        let mock = MockAdapter::new();
        let config = ConnectionConfig::new("/dev/ttyACM0", 9600).with_timeout(timeout);
        (
            Connection::new(mock.clone(), LineFramer::crlf(), config),
            mock,
        )
    }

    #[test]
    fn test_open_close_transitions() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.open().unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(mock.is_connected());
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!mock.is_connected());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut conn, _mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.close();
        conn.open().unwrap();
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_open_failure_keeps_closed() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        mock.refuse_connect("Permission denied");
        let err = conn.open().unwrap_err();
        assert!(matches!(err, DeviceError::Transport { .. }));
        assert_eq!(conn.state(), ConnectionState::Closed);
        // The user fixed the permissions; retry works
        conn.open().unwrap();
        assert!(conn.is_open());
    }

    #[test]
    fn test_config_applied_at_open() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.config_mut().baud_rate = 19200;
        conn.config_mut().timeout = Duration::from_millis(250);
        conn.open().unwrap();
        let applied = mock.last_config().unwrap();
        assert_eq!(applied.baud_rate, 19200);
        assert_eq!(applied.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_send_requires_open() {
        let (mut conn, _mock) = mock_connection(DEFAULT_TIMEOUT);
        assert!(matches!(conn.send("a"), Err(DeviceError::NotConnected)));
        assert!(matches!(conn.query("a"), Err(DeviceError::NotConnected)));
    }

    #[test]
    fn test_send_writes_frame() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        conn.send("v1000").unwrap();
        assert_eq!(mock.written(), b"v1000\r\n".to_vec());
    }

    #[test]
    fn test_query_returns_decoded_line() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        mock.push_line("123.4");
        assert_eq!(conn.query("a").unwrap(), "123.4");
        assert_eq!(mock.written_frames(), vec!["a"]);
    }

    #[test]
    fn test_query_reads_exactly_one_line() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        mock.push_bytes(b"first\r\nsecond\r\n");
        assert_eq!(conn.query("a").unwrap(), "first");
        assert_eq!(conn.receive().unwrap(), "second");
    }

    #[test]
    fn test_query_times_out_without_partial_data() {
        let (mut conn, mock) = mock_connection(Duration::from_millis(20));
        conn.open().unwrap();
        mock.push_bytes(b"12.");
        let err = conn.query("a").unwrap_err();
        assert!(matches!(err, DeviceError::Timeout(t) if t == Duration::from_millis(20)));
        // Connection stays usable after a timeout
        assert!(conn.is_open());
    }

    #[test]
    fn test_reset_buffers_discards_input() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        mock.push_line("stale");
        conn.reset_buffers().unwrap();
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn test_drop_releases_port() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        drop(conn);
        assert!(!mock.is_connected());
    }

    /// Delivers scripted bytes at fixed offsets from the last write and blocks
    /// each read for the full timeout it is given, like a real tty.
    #[derive(Debug)]
    struct SlowPort {
        written_at: Option<Instant>,
        arrivals: std::collections::VecDeque<(Duration, u8)>,
    }

    impl SlowPort {
        fn new(arrivals: &[(u64, &str)]) -> Self {
            let arrivals = arrivals
                .iter()
                .flat_map(|&(at, text)| text.bytes().map(move |b| (Duration::from_millis(at), b)))
                .collect();
            Self {
                written_at: None,
                arrivals,
            }
        }
    }

    impl Adapter for SlowPort {
        fn name(&self) -> &str {
            "slow"
        }

        fn connect(&mut self, _config: &ConnectionConfig) -> AppResult<()> {
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            true
        }

        fn write(&mut self, _bytes: &[u8]) -> AppResult<()> {
            self.written_at = Some(Instant::now());
            Ok(())
        }

        fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
            let now = Instant::now();
            let origin = self.written_at.unwrap_or(now);
            match self.arrivals.front() {
                Some(&(at, byte)) if origin + at <= now + timeout => {
                    let ready = origin + at;
                    if ready > now {
                        std::thread::sleep(ready - now);
                    }
                    self.arrivals.pop_front();
                    buffer[0] = byte;
                    Ok(1)
                }
                _ => {
                    std::thread::sleep(timeout);
                    Err(ErrorKind::TimedOut.into())
                }
            }
        }

        fn clear(&mut self) -> AppResult<()> {
            self.arrivals.clear();
            Ok(())
        }
    }

    fn slow_connection(arrivals: &[(u64, &str)]) -> Connection<SlowPort> {
        let config =
            ConnectionConfig::new("/dev/ttyUSB0", 9600).with_timeout(Duration::from_millis(100));
        let mut conn = Connection::new(SlowPort::new(arrivals), LineFramer::crlf(), config);
        conn.open().unwrap();
        conn
    }

    #[test]
    fn test_query_never_blocks_past_timeout() {
        let mut conn = slow_connection(&[(95, "1")]);
        let started = Instant::now();
        let result = conn.query("a");
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(DeviceError::Timeout(_))));
        assert!(
            elapsed < Duration::from_millis(150),
            "query blocked {:?} for a 100ms timeout",
            elapsed
        );
    }

    #[test]
    fn test_late_terminator_is_a_timeout() {
        let mut conn = slow_connection(&[(10, "1\r"), (150, "\n")]);
        assert!(matches!(conn.query("a"), Err(DeviceError::Timeout(_))));
    }

    #[test]
    fn test_line_inside_window_is_returned() {
        let mut conn = slow_connection(&[(10, "1\r"), (40, "\n")]);
        assert_eq!(conn.query("a").unwrap(), "1");
    }

    #[traced_test]
    #[test]
    fn test_frames_are_logged() {
        let (mut conn, mock) = mock_connection(DEFAULT_TIMEOUT);
        conn.open().unwrap();
        mock.push_line("OK");
        conn.query("v500").unwrap();
        assert!(logs_contain("Sent command: v500"));
        assert!(logs_contain("Received response: OK"));
    }

    #[test]
    fn test_config_serde_uses_humantime() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"port":"COM3","baud_rate":4800,"timeout":"250ms"}"#)
                .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.baud_rate, 4800);
    }
}
