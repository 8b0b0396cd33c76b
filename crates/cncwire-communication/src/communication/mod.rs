//! Transport layer
//!
//! A [`Transport`] is the duplex byte stream a controller session owns:
//! serial port, TCP socket, or the in-memory loopback used for simulation.
//! Inbound traffic and faults are delivered as [`TransportEvent`]s through
//! the sink the session installs before opening.

pub mod command_queue;
pub mod loopback;
pub mod serial;
pub mod tcp;

use cncwire_core::{ConnectionInfo, ConnectionType, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use command_queue::{CommandQueue, ListenerId};
pub use loopback::{LoopbackHandle, LoopbackTransport};
pub use serial::{list_ports, SerialPortInfo, SerialTransport, UsbIdentity};
pub use tcp::TcpTransport;

/// Event emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes received, in arrival order
    Data(Vec<u8>),
    /// Peer or device went away
    Disconnect,
    /// Read or write fault
    Error(String),
}

/// Channel end a transport pushes its events into
pub type TransportEventSink = mpsc::UnboundedSender<TransportEvent>;

/// Duplex stream a controller session can own
///
/// Exactly one session owns a transport at a time. Events must be delivered
/// in arrival order.
pub trait Transport: Send {
    /// Transport family
    fn connection_type(&self) -> ConnectionType;

    /// Port path or `host:port`
    fn ident(&self) -> String;

    /// Options the transport was configured with
    fn options(&self) -> serde_json::Value;

    /// Open the underlying device
    fn open(&mut self) -> Result<()>;

    /// Close the underlying device
    fn close(&mut self) -> Result<()>;

    /// Write bytes as-is
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Check whether the device is open
    fn is_open(&self) -> bool;

    /// Install or remove the event sink
    fn set_event_sink(&mut self, sink: Option<TransportEventSink>);

    /// The `{ type, ident, options }` triple of this transport
    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_type: self.connection_type(),
            ident: self.ident(),
            options: self.options(),
        }
    }
}

/// Connection driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionDriver {
    /// Serial/USB port
    Serial,
    /// TCP socket
    Tcp,
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity bit
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a serial or TCP transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Driver type
    pub driver: ConnectionDriver,
    /// Serial device path or TCP hostname
    pub port: String,
    /// TCP port (ignored for serial)
    pub network_port: u16,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial data bits (5-8)
    pub data_bits: u8,
    /// Serial stop bits (1-2)
    pub stop_bits: u8,
    /// Serial parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Connect / read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: "/dev/ttyUSB0".to_string(),
            network_port: 8888,
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 5000,
        }
    }
}

impl ConnectionParams {
    /// Serial parameters for a device path and baud rate
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// TCP parameters for a host and port
    pub fn tcp(host: impl Into<String>, network_port: u16) -> Self {
        Self {
            driver: ConnectionDriver::Tcp,
            port: host.into(),
            network_port,
            ..Default::default()
        }
    }
}

/// Classify a read error as a device disappearing rather than a fault
pub(crate) fn is_disconnect_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    // EIO is what Linux returns on reads from an unplugged USB serial device.
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    ) || err.raw_os_error() == Some(5)
}

/// Check if a read error only means "no data yet"
pub(crate) fn is_idle_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        err.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_params_constructors() {
        let serial = ConnectionParams::serial("/dev/ttyACM0", 250000);
        assert_eq!(serial.driver, ConnectionDriver::Serial);
        assert_eq!(serial.baud_rate, 250000);

        let tcp = ConnectionParams::tcp("localhost", 23);
        assert_eq!(tcp.driver, ConnectionDriver::Tcp);
        assert_eq!(tcp.port, "localhost");
        assert_eq!(tcp.network_port, 23);
    }

    #[test]
    fn test_error_classification() {
        use std::io::{Error, ErrorKind};

        assert!(is_disconnect_error(&Error::from(ErrorKind::BrokenPipe)));
        assert!(is_disconnect_error(&Error::from_raw_os_error(5)));
        assert!(!is_disconnect_error(&Error::from(ErrorKind::PermissionDenied)));
        assert!(is_idle_error(&Error::from(ErrorKind::TimedOut)));
        assert!(!is_idle_error(&Error::from(ErrorKind::BrokenPipe)));
    }
}
