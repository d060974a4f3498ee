//! Serial port discovery

use serde::Serialize;
use tokio_serial::SerialPortType;

use super::TransportError;

/// A serial port available on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub path: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            manufacturer: None,
            product: None,
        }
    }

    /// One-line description for prompts and logs
    pub fn label(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} ({} {})", self.path, m, p),
            (Some(m), None) => format!("{} ({})", self.path, m),
            (None, Some(p)) => format!("{} ({})", self.path, p),
            (None, None) => self.path.clone(),
        }
    }
}

/// Enumerate serial ports
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TransportError::Enumerate(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                path: port.port_name,
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => PortInfo::new(port.port_name),
        })
        .collect())
}

/// Pick the port most likely to be the actuator
///
/// Matches `hint` case-insensitively against the manufacturer first, then the
/// product, then the path. Returns `None` if nothing matches or the hint is
/// empty.
pub fn suggest_port<'a>(ports: &'a [PortInfo], hint: &str) -> Option<&'a PortInfo> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    let matches = |field: &Option<String>| {
        field
            .as_deref()
            .is_some_and(|value| value.to_lowercase().contains(&hint))
    };

    ports
        .iter()
        .find(|port| matches(&port.manufacturer))
        .or_else(|| ports.iter().find(|port| matches(&port.product)))
        .or_else(|| {
            ports
                .iter()
                .find(|port| port.path.to_lowercase().contains(&hint))
        })
}
