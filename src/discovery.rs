//! Serial port discovery and selection.
//!
//! Enumeration order is whatever the host reports; it is not sorted and may
//! change between calls as devices come and go. Selections are therefore
//! tracked by device path and re-resolved after every refresh.

use crate::error::AppResult;
use serde::Serialize;
use tracing::debug;

/// Separator between device path and manufacturer in a port label.
pub const LABEL_SEPARATOR: &str = "  |  ";

/// Snapshot of one serial port at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortDescriptor {
    /// Port path or identifier (e.g., "/dev/ttyACM0", "COM3")
    pub device: String,
    /// USB manufacturer string, when the port reports one
    pub manufacturer: Option<String>,
    /// Human-readable description, matched against the port filter
    pub description: String,
}

impl PortDescriptor {
    /// Display text: `device`, or `device  |  manufacturer` when known.
    pub fn label(&self) -> String {
        match &self.manufacturer {
            Some(manufacturer) => format!("{}{}{}", self.device, LABEL_SEPARATOR, manufacturer),
            None => self.device.clone(),
        }
    }
}

/// Source of port snapshots.
pub trait PortEnumerator {
    /// Current snapshot of the ports, in host order.
    fn enumerate(&self) -> AppResult<Vec<PortDescriptor>>;
}

impl<F> PortEnumerator for F
where
    F: Fn() -> AppResult<Vec<PortDescriptor>>,
{
    fn enumerate(&self) -> AppResult<Vec<PortDescriptor>> {
        self()
    }
}

/// The host's serial ports, as reported by the serialport crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    #[cfg(feature = "instrument_serial")]
    fn enumerate(&self) -> AppResult<Vec<PortDescriptor>> {
        let ports = serialport::available_ports().map_err(enumeration_error)?;
        Ok(ports.into_iter().map(describe).collect())
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn enumerate(&self) -> AppResult<Vec<PortDescriptor>> {
        Err(crate::error::DeviceError::SerialFeatureDisabled)
    }
}

/// Pseudo port name reported when listing ports itself fails.
pub const ENUMERATION_PORT: &str = "<enumeration>";

#[cfg(feature = "instrument_serial")]
fn enumeration_error(e: serialport::Error) -> crate::error::DeviceError {
    crate::error::DeviceError::transport(ENUMERATION_PORT, format!("{:?}: {}", e.kind(), e))
}

#[cfg(feature = "instrument_serial")]
fn describe(info: serialport::SerialPortInfo) -> PortDescriptor {
    let fallback = base_name(&info.port_name);
    match info.port_type {
        serialport::SerialPortType::UsbPort(usb) => PortDescriptor {
            description: usb.product.unwrap_or(fallback),
            manufacturer: usb.manufacturer,
            device: info.port_name,
        },
        _ => PortDescriptor {
            description: fallback,
            manufacturer: None,
            device: info.port_name,
        },
    }
}

/// `/dev/ttyACM0` -> `ttyACM0`; `COM3` stays `COM3`.
#[cfg_attr(not(feature = "instrument_serial"), allow(dead_code))]
fn base_name(port_name: &str) -> String {
    port_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(port_name)
        .to_string()
}

/// Ports whose description contains `filter` (case-sensitive), in enumeration order.
pub fn discover(enumerator: &impl PortEnumerator, filter: &str) -> AppResult<Vec<PortDescriptor>> {
    let ports: Vec<PortDescriptor> = enumerator
        .enumerate()?
        .into_iter()
        .filter(|port| port.description.contains(filter))
        .collect();
    debug!("{} port(s) match filter {:?}", ports.len(), filter);
    Ok(ports)
}

/// [`discover`] against the host's ports.
pub fn list_ports(filter: &str) -> AppResult<Vec<PortDescriptor>> {
    discover(&SystemPorts, filter)
}

/// Filtered port list plus the user's current pick.
#[derive(Debug)]
pub struct PortSelection<E: PortEnumerator = SystemPorts> {
    enumerator: E,
    filter: String,
    ports: Vec<PortDescriptor>,
    selected: Option<PortDescriptor>,
}

impl PortSelection<SystemPorts> {
    /// Selection over the host's ports.
    pub fn system(filter: impl Into<String>) -> Self {
        Self::new(SystemPorts, filter)
    }
}

impl<E: PortEnumerator> PortSelection<E> {
    /// Empty selection; call [`refresh`](Self::refresh) to populate it.
    pub fn new(enumerator: E, filter: impl Into<String>) -> Self {
        Self {
            enumerator,
            filter: filter.into(),
            ports: Vec::new(),
            selected: None,
        }
    }

    /// Description substring ports must contain.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Ports from the last refresh.
    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    /// Display labels of the last refresh, in the same order.
    pub fn labels(&self) -> Vec<String> {
        self.ports.iter().map(PortDescriptor::label).collect()
    }

    /// Current pick, if any.
    pub fn selected(&self) -> Option<&PortDescriptor> {
        self.selected.as_ref()
    }

    /// Re-enumerate and re-resolve the selection by device path.
    ///
    /// The selection picks up the fresh snapshot (e.g. a changed manufacturer
    /// string) and is cleared if its device disappeared.
    pub fn refresh(&mut self) -> AppResult<&[PortDescriptor]> {
        self.ports = discover(&self.enumerator, &self.filter)?;
        if let Some(previous) = self.selected.take() {
            self.selected = self.find_device(&previous.device).cloned();
            if self.selected.is_none() {
                debug!("Selected port '{}' is gone", previous.device);
            }
        }
        Ok(&self.ports)
    }

    /// Select by position in the last refreshed list.
    pub fn select_index(&mut self, index: usize) -> Option<&PortDescriptor> {
        self.selected = self.ports.get(index).cloned();
        self.selected.as_ref()
    }

    /// Select by a label shown earlier.
    ///
    /// Only the device part of the label is compared, so a label rendered
    /// before the manufacturer string changed still finds its port.
    pub fn select_label(&mut self, label: &str) -> Option<&PortDescriptor> {
        let device = label.split(LABEL_SEPARATOR).next().unwrap_or(label).trim();
        self.selected = self.find_device(device).cloned();
        self.selected.as_ref()
    }

    /// Forget the current pick.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    fn find_device(&self, device: &str) -> Option<&PortDescriptor> {
        self.ports.iter().find(|port| port.device == device)
    }
}
