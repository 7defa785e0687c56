//! Instrument drivers.
//!
//! Both devices share one capability, [`Instrument`]: open, close, send and
//! query over a framed [`Connection`]. The trait is implemented once through
//! its provided methods; a driver only supplies its [`DeviceProfile`] constants
//! and access to its connection.
//!
//! ```no_run
//! use labserial::catalog::CommandCatalog;
//! use labserial::connection::ConnectionConfig;
//! use labserial::instrument::{HighVoltageController, Instrument};
//! use labserial::resolver::ResolutionQuery;
//!
//! # fn main() -> labserial::error::AppResult<()> {
//! let catalog = CommandCatalog::embedded()?;
//! let mut hv = HighVoltageController::new(ConnectionConfig::new("/dev/ttyACM0", 9600));
//! hv.open()?;
//! hv.apply(&catalog, &ResolutionQuery::for_static("1000"))?;
//! hv.stop(&catalog)?;
//! hv.close();
//! # Ok(())
//! # }
//! ```

pub mod hv_controller;
pub mod loadcell;

pub use hv_controller::HighVoltageController;
pub use loadcell::{Loadcell, Measurement};

use crate::adapters::Adapter;
use crate::connection::{Connection, ConnectionConfig, ConnectionState};
use crate::discovery::{PortEnumerator, PortSelection, SystemPorts};
use crate::error::{AppResult, DeviceError};
use crate::protocol::{LineFramer, CRLF};
use std::time::Duration;
use tracing::info;

/// Baud rates offered for both instruments.
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [2400, 4800, 9600, 14400, 19200, 28800];

/// Per-device constants; the only thing that differs between drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Instrument identifier used in logs and messages
    pub name: &'static str,
    /// Frame terminator
    pub delimiter: &'static str,
    /// Read timeout applied at `open()` unless overridden
    pub default_timeout: Duration,
    /// Baud rate used unless settings override it
    pub default_baud_rate: u32,
    /// Substring a port description must contain to be offered (empty = all)
    pub port_filter: &'static str,
}

impl DeviceProfile {
    /// Framer for this device's delimiter.
    pub fn framer(&self) -> LineFramer {
        LineFramer::new(self.delimiter)
    }

    /// Connection settings for `port` using this profile's defaults.
    pub fn connection_config(&self, port: impl Into<String>) -> ConnectionConfig {
        ConnectionConfig::new(port, self.default_baud_rate).with_timeout(self.default_timeout)
    }
}

/// DIY high-voltage supply controller.
pub const HIGH_VOLTAGE_PROFILE: DeviceProfile = DeviceProfile {
    name: "high-voltage controller",
    delimiter: CRLF,
    default_timeout: Duration::from_millis(100),
    default_baud_rate: 9600,
    port_filter: "",
};

/// Tensile tester load-cell amplifier.
pub const LOADCELL_PROFILE: DeviceProfile = DeviceProfile {
    name: "load cell",
    delimiter: CRLF,
    default_timeout: Duration::from_millis(100),
    default_baud_rate: 9600,
    port_filter: "",
};

/// Open/close/send/query capability shared by every driver.
pub trait Instrument {
    /// Byte transport underneath the connection.
    type Adapter: Adapter;

    /// Constants of this device family.
    fn profile(&self) -> &DeviceProfile;

    /// Instrument identifier
    fn id(&self) -> &str {
        self.profile().name
    }

    /// Port filter for this instance; defaults to the profile's.
    fn port_filter(&self) -> &str {
        self.profile().port_filter
    }

    /// Connection owned by this instrument.
    fn connection(&self) -> &Connection<Self::Adapter>;

    /// Mutable access to the owned connection.
    fn connection_mut(&mut self) -> &mut Connection<Self::Adapter>;

    /// Host ports offered for this instrument, narrowed by [`port_filter`](Self::port_filter).
    fn port_selection(&self) -> PortSelection<SystemPorts> {
        PortSelection::system(self.port_filter())
    }

    /// Point the connection at the only port matching this instrument's filter.
    ///
    /// Fails with `Config` when no port or more than one port matches. Takes
    /// effect at the next `open()`.
    fn auto_select_port<E: PortEnumerator>(&mut self, enumerator: E) -> AppResult<String> {
        let mut selection = PortSelection::new(enumerator, self.port_filter());
        selection.refresh()?;
        let device = match selection.ports() {
            [only] => only.device.clone(),
            [] => {
                return Err(DeviceError::Config(format!(
                    "no serial port matches filter {:?} for the {}",
                    selection.filter(),
                    self.id()
                )))
            }
            many => {
                return Err(DeviceError::Config(format!(
                    "{} serial ports match filter {:?} for the {}; choose one explicitly",
                    many.len(),
                    selection.filter(),
                    self.id()
                )))
            }
        };
        info!("Using '{}' for the {}", device, self.id());
        self.connection_mut().config_mut().port = device.clone();
        Ok(device)
    }

    /// Claim the configured port.
    fn open(&mut self) -> AppResult<()> {
        self.connection_mut().open()
    }

    /// Release the port; a no-op when already closed.
    fn close(&mut self) {
        self.connection_mut().close()
    }

    /// Send one command without waiting for a reply.
    fn send(&mut self, command: &str) -> AppResult<()> {
        self.connection_mut().send(command)
    }

    /// Send one command and wait for one reply line.
    fn query(&mut self, command: &str) -> AppResult<String> {
        self.connection_mut().query(command)
    }

    /// Current connection state.
    fn state(&self) -> ConnectionState {
        self.connection().state()
    }

    /// Whether the port is claimed.
    fn is_open(&self) -> bool {
        self.connection().is_open()
    }
}
