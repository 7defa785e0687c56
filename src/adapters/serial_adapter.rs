//! Serial port adapter built on the serialport crate.
//!
//! Compiled as a stub returning [`DeviceError::SerialFeatureDisabled`] when the
//! `instrument_serial` feature is off.

use super::Adapter;
use crate::connection::ConnectionConfig;
use crate::error::{AppResult, DeviceError};
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

/// Serial adapter for RS-232 / USB-CDC communication
///
/// This adapter wraps the serialport crate. All calls block the current
/// thread; each read sets the port timeout to the window the connection has
/// left, so a read returns `TimedOut` instead of hanging past the deadline.
#[derive(Default)]
pub struct SerialAdapter {
    /// Port name of the open handle (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,

    #[cfg(feature = "instrument_serial")]
    port: Option<Box<dyn SerialPort>>,
}

impl SerialAdapter {
    /// An adapter with no port claimed yet.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "instrument_serial")]
    fn port_mut(&mut self) -> AppResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(DeviceError::NotConnected)
    }
}

impl std::fmt::Debug for SerialAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialAdapter")
            .field("port_name", &self.port_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Adapter for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    fn connect(&mut self, config: &ConnectionConfig) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            // serialport opens ttys in exclusive mode, so a second claim on the
            // same device fails here rather than interleaving frames.
            let port = serialport::new(&config.port, config.baud_rate)
                .timeout(config.timeout)
                .open()
                .map_err(|e| DeviceError::transport(&config.port, e))?;

            self.port_name = config.port.clone();
            self.port = Some(port);

            debug!(
                "Serial port '{}' opened at {} baud",
                self.port_name, config.baud_rate
            );
            Ok(())
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = config;
            Err(DeviceError::SerialFeatureDisabled)
        }
    }

    fn disconnect(&mut self) {
        #[cfg(feature = "instrument_serial")]
        {
            if self.port.take().is_some() {
                debug!("Serial port '{}' closed", self.port_name);
            }
        }
    }

    fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            use std::io::Write;

            let port_name = self.port_name.clone();
            let port = self.port_mut()?;
            port.write_all(bytes)
                .map_err(|e| DeviceError::transport(&port_name, e))?;
            port.flush()
                .map_err(|e| DeviceError::transport(&port_name, e))
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = bytes;
            Err(DeviceError::SerialFeatureDisabled)
        }
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        #[cfg(feature = "instrument_serial")]
        {
            use std::io::Read;

            match self.port.as_mut() {
                Some(port) => {
                    // Shrink the port timeout to the caller's remaining window
                    port.set_timeout(timeout)?;
                    port.read(buffer)
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "serial port not open",
                )),
            }
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            let _ = (buffer, timeout);
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "serial support not enabled",
            ))
        }
    }

    fn clear(&mut self) -> AppResult<()> {
        #[cfg(feature = "instrument_serial")]
        {
            let port_name = self.port_name.clone();
            self.port_mut()?
                .clear(serialport::ClearBuffer::All)
                .map_err(|e| DeviceError::transport(&port_name, e))
        }

        #[cfg(not(feature = "instrument_serial"))]
        {
            Err(DeviceError::SerialFeatureDisabled)
        }
    }
}
