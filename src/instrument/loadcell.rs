//! Load-cell amplifier of the electromechanical tensile tester.
//!
//! Protocol: `a` queries the current tension (grams, one float per line),
//! `b` zeroes the amplifier.

use super::{DeviceProfile, Instrument, LOADCELL_PROFILE};
use crate::adapters::{Adapter, SerialAdapter};
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{AppResult, DeviceError};
use serde::Serialize;
use tracing::{debug, info};

const MEASURE_COMMAND: &str = "a";
const FIX_ZERO_COMMAND: &str = "b";

/// `(name, unit)` of every value the load cell reports.
pub const PARAMETERS: [(&str, &str); 1] = [("Tension", "g")];

/// One reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Parameter name, e.g. `Tension`
    pub parameter: &'static str,
    /// Unit symbol, e.g. `g`
    pub unit: &'static str,
    /// Reported value
    pub value: f64,
}

/// Load cell of the tensile tester.
#[derive(Debug)]
pub struct Loadcell<A: Adapter = SerialAdapter> {
    connection: Connection<A>,
    port_filter: String,
}

impl Loadcell<SerialAdapter> {
    /// Driver on a real serial port.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_adapter(SerialAdapter::new(), config)
    }
}

impl<A: Adapter> Loadcell<A> {
    /// Driver on any adapter, e.g. [`MockAdapter`](crate::adapters::MockAdapter).
    pub fn with_adapter(adapter: A, config: ConnectionConfig) -> Self {
        Self {
            connection: Connection::new(adapter, LOADCELL_PROFILE.framer(), config),
            port_filter: LOADCELL_PROFILE.port_filter.to_string(),
        }
    }

    /// Override the profile's port filter.
    pub fn with_port_filter(mut self, filter: impl Into<String>) -> Self {
        self.port_filter = filter.into();
        self
    }

    /// `(name, unit)` pairs this device reports.
    pub fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &PARAMETERS
    }

    /// Query one tension reading.
    pub fn measure(&mut self) -> AppResult<Measurement> {
        let response = self.query(MEASURE_COMMAND)?;
        let value = parse_reading(&response)?;
        let (parameter, unit) = PARAMETERS[0];
        debug!("{} = {} {}", parameter, value, unit);
        Ok(Measurement {
            parameter,
            unit,
            value,
        })
    }

    /// Zero the amplifier at the current load.
    pub fn fix_zero(&mut self) -> AppResult<()> {
        self.send(FIX_ZERO_COMMAND)?;
        info!("Load cell zeroed");
        Ok(())
    }

    /// Read one unsolicited line.
    pub fn receive(&mut self) -> AppResult<String> {
        self.connection.receive()
    }

    /// Drop stale bytes, e.g. readings streamed before the port was opened.
    pub fn reset_buffers(&mut self) -> AppResult<()> {
        self.connection.reset_buffers()
    }
}

fn parse_reading(response: &str) -> AppResult<f64> {
    let trimmed = response.trim();
    trimmed.parse::<f64>().map_err(|_| {
        DeviceError::InvalidResponse(format!("expected a tension reading, got {:?}", trimmed))
    })
}

impl<A: Adapter> Instrument for Loadcell<A> {
    type Adapter = A;

    fn profile(&self) -> &DeviceProfile {
        &LOADCELL_PROFILE
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
