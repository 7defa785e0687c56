//! Controller for the DIY high-voltage supply.
//!
//! The supply's firmware takes literal commands from the command catalog; it
//! does not acknowledge them, so everything here is fire-and-forget.

use super::{DeviceProfile, Instrument, HIGH_VOLTAGE_PROFILE};
use crate::adapters::{Adapter, SerialAdapter};
use crate::catalog::CommandCatalog;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::AppResult;
use crate::resolver::{resolve, ResolutionQuery};
use tracing::info;

/// DIY high-voltage supply driven through catalog commands.
#[derive(Debug)]
pub struct HighVoltageController<A: Adapter = SerialAdapter> {
    connection: Connection<A>,
    port_filter: String,
}

impl HighVoltageController<SerialAdapter> {
    /// Driver on a real serial port.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_adapter(SerialAdapter::new(), config)
    }
}

impl<A: Adapter> HighVoltageController<A> {
    /// Driver on any adapter, e.g. [`MockAdapter`](crate::adapters::MockAdapter).
    pub fn with_adapter(adapter: A, config: ConnectionConfig) -> Self {
        Self {
            connection: Connection::new(adapter, HIGH_VOLTAGE_PROFILE.framer(), config),
            port_filter: HIGH_VOLTAGE_PROFILE.port_filter.to_string(),
        }
    }

    /// Override the profile's port filter.
    pub fn with_port_filter(mut self, filter: impl Into<String>) -> Self {
        self.port_filter = filter.into();
        self
    }

    /// Resolve `query` against `catalog` and send the command.
    ///
    /// Returns the command that was sent. An unmatched query fails with
    /// `CommandNotFound` before anything is written.
    pub fn apply(&mut self, catalog: &CommandCatalog, query: &ResolutionQuery) -> AppResult<String> {
        let command = resolve(catalog, query)?.to_string();
        self.send(&command)?;
        info!("Applied {} as '{}'", query, command);
        Ok(command)
    }

    /// Send the catalog's stop command.
    pub fn stop(&mut self, catalog: &CommandCatalog) -> AppResult<()> {
        self.send(catalog.stop_command())?;
        info!("Sent stop command '{}'", catalog.stop_command());
        Ok(())
    }
}

impl<A: Adapter> Instrument for HighVoltageController<A> {
    type Adapter = A;

    fn profile(&self) -> &DeviceProfile {
        &HIGH_VOLTAGE_PROFILE
    }

    fn port_filter(&self) -> &str {
        &self.port_filter
    }

    fn connection(&self) -> &Connection<A> {
        &self.connection
    }

    fn connection_mut(&mut self) -> &mut Connection<A> {
        &mut self.connection
    }
}
