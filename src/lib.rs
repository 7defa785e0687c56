//! Core library for the labserial tools.
//!
//! This library contains the device-control layer shared by the DIY
//! high-voltage supply controller and the tensile tester's load cell:
//! line framing, the serial connection lifecycle, the command catalog and
//! its resolver, and serial port discovery. It is used by the `labserial`
//! command-line front end.
//!
//! # Data Flow
//!
//! ```text
//! discovery ──port──> connection.open() ──frames──> device
//!                          ^
//! catalog ──resolver──> command
//! ```
//!
//! All I/O is blocking and single-threaded. Callers that must stay responsive
//! run device calls on their own worker thread.

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod protocol;
pub mod resolver;

pub use adapters::{Adapter, MockAdapter, SerialAdapter};
pub use catalog::{load_catalog, load_user_catalog, CommandCatalog, DynamicCommand, StaticCommand};
pub use config::Settings;
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use discovery::{discover, list_ports, PortDescriptor, PortSelection};
pub use error::{AppResult, DeviceError};
pub use instrument::{HighVoltageController, Instrument, Loadcell, Measurement};
pub use resolver::{resolve, resolve_command, Mode, ResolutionQuery};

/// Open a serial connection with `"\r\n"` framing.
pub fn open_connection(port: &str, baud_rate: u32) -> AppResult<Connection> {
    let mut connection = Connection::serial(ConnectionConfig::new(port, baud_rate));
    connection.open()?;
    Ok(connection)
}

/// Close and release a connection.
pub fn close_connection(mut connection: Connection) {
    connection.close();
}
