//! Serial port transport
//!
//! USB or RS-232 connection to a controller. Opening the port starts a
//! reader thread that forwards inbound bytes to the session as
//! [`TransportEvent`]s; port enumeration is filtered to device names that
//! controllers show up as.

use super::{
    is_disconnect_error, is_idle_error, ConnectionDriver, ConnectionParams, SerialParity,
    Transport, TransportEvent, TransportEventSink,
};
use cncwire_core::{ConnectionError, ConnectionType, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// USB identity of a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbIdentity {
    /// Vendor id
    pub vid: u16,
    /// Product id
    pub pid: u16,
    /// Manufacturer string
    pub manufacturer: Option<String>,
    /// Device serial number
    pub serial_number: Option<String>,
}

/// A serial device that could host a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialPortInfo {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`
    pub port_name: String,
    /// Human readable kind of port
    pub description: String,
    /// Present for USB adapters
    pub usb: Option<UsbIdentity>,
}

impl From<&serialport::SerialPortInfo> for SerialPortInfo {
    fn from(port: &serialport::SerialPortInfo) -> Self {
        use serialport::SerialPortType;

        let (description, usb) = match &port.port_type {
            SerialPortType::UsbPort(usb) => (
                format!(
                    "USB {} {}",
                    usb.manufacturer.as_deref().unwrap_or("Device"),
                    usb.product.as_deref().unwrap_or("Serial Port")
                ),
                Some(UsbIdentity {
                    vid: usb.vid,
                    pid: usb.pid,
                    manufacturer: usb.manufacturer.clone(),
                    serial_number: usb.serial_number.clone(),
                }),
            ),
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
            SerialPortType::PciPort => ("PCI".to_string(), None),
            _ => ("Serial Port".to_string(), None),
        };

        Self {
            port_name: port.port_name.clone(),
            description,
            usb,
        }
    }
}

/// Serial ports that look like CNC controllers
///
/// USB CDC/FTDI devices, Windows COM ports, and `/tmp/tty*` links made by
/// the serial bridge.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        serial_error(format!("port enumeration failed: {}", e))
    })?;

    let found: Vec<SerialPortInfo> = ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(SerialPortInfo::from)
        .collect();
    tracing::debug!("{} of {} serial ports usable", found.len(), ports.len());
    Ok(found)
}

fn is_controller_port(name: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "/dev/ttyUSB",
        "/dev/ttyACM",
        "/tmp/tty",
        "/dev/cu.usbserial-",
        "/dev/cu.usbmodem",
    ];

    match name.strip_prefix("COM") {
        Some(number) => !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()),
        None => PREFIXES.iter().any(|prefix| name.starts_with(prefix)),
    }
}

impl From<SerialParity> for serialport::Parity {
    fn from(parity: SerialParity) -> Self {
        match parity {
            SerialParity::None => serialport::Parity::None,
            SerialParity::Even => serialport::Parity::Even,
            SerialParity::Odd => serialport::Parity::Odd,
        }
    }
}

fn serial_error(reason: impl Into<String>) -> Error {
    ConnectionError::SerialError {
        reason: reason.into(),
    }
    .into()
}

/// Serial port transport backed by the `serialport` crate
pub struct SerialTransport {
    params: ConnectionParams,
    port: Option<Box<dyn serialport::SerialPort>>,
    sink: Arc<Mutex<Option<TransportEventSink>>>,
    open: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create a closed serial transport
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            port: None,
            sink: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    fn builder(&self) -> Result<serialport::SerialPortBuilder> {
        let params = &self.params;
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid data bits: {}", other),
                }
                .into())
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(ConnectionError::InvalidParameters {
                    reason: format!("Invalid stop bits: {}", other),
                }
                .into())
            }
        };

        // Short read timeout keeps the reader thread responsive to close().
        Ok(serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(10))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(params.parity.into())
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            }))
    }

    fn join_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                tracing::warn!(port = %self.params.port, "Serial reader thread panicked");
            }
        }
    }
}

fn emit(sink: &Mutex<Option<TransportEventSink>>, event: TransportEvent) {
    if let Some(sink) = sink.lock().as_ref() {
        let _ = sink.send(event);
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    ident: String,
    sink: Arc<Mutex<Option<TransportEventSink>>>,
    open: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 1024];
    while !stop.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => emit(&sink, TransportEvent::Data(buf[..n].to_vec())),
            Err(e) if is_idle_error(&e) => continue,
            Err(e) => {
                open.store(false, Ordering::SeqCst);
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if is_disconnect_error(&e) {
                    tracing::debug!(port = %ident, "Serial device went away: {}", e);
                    emit(&sink, TransportEvent::Disconnect);
                } else {
                    emit(&sink, TransportEvent::Error(e.to_string()));
                }
                break;
            }
        }
    }
}

impl Transport for SerialTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Serial
    }

    fn ident(&self) -> String {
        self.params.port.clone()
    }

    fn options(&self) -> serde_json::Value {
        serde_json::json!({
            "baudRate": self.params.baud_rate,
            "dataBits": self.params.data_bits,
            "stopBits": self.params.stop_bits,
            "parity": self.params.parity,
            "rtscts": self.params.flow_control,
        })
    }

    fn open(&mut self) -> Result<()> {
        if self.params.driver != ConnectionDriver::Serial {
            return Err(ConnectionError::InvalidParameters {
                reason: "SerialTransport requires Serial driver type".to_string(),
            }
            .into());
        }
        if self.is_open() {
            return Err(ConnectionError::FailedToOpen {
                port: self.params.port.clone(),
                reason: "already open".to_string(),
            }
            .into());
        }
        self.join_reader();

        let port = self.builder()?.open().map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", self.params.port, e);
            Error::from(ConnectionError::FailedToOpen {
                port: self.params.port.clone(),
                reason: e.to_string(),
            })
        })?;
        let reader_port = port
            .try_clone()
            .map_err(|e| serial_error(format!("Failed to clone port handle: {}", e)))?;

        self.stop.store(false, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);

        let ident = self.params.port.clone();
        let sink = self.sink.clone();
        let open = self.open.clone();
        let stop = self.stop.clone();
        let reader = std::thread::Builder::new()
            .name(format!("serial-reader:{}", ident))
            .spawn(move || read_loop(reader_port, ident, sink, open, stop))
            .map_err(|e| serial_error(format!("Failed to spawn reader thread: {}", e)))?;

        self.port = Some(port);
        self.reader = Some(reader);
        tracing::info!(port = %self.params.port, baud = self.params.baud_rate, "Serial port opened");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        self.join_reader();

        if let Some(mut port) = self.port.take() {
            port.flush()
                .map_err(|e| serial_error(format!("Failed to flush on close: {}", e)))?;
        }
        tracing::info!(port = %self.params.port, "Serial port closed");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or_else(|| {
            Error::from(ConnectionError::SerialError {
                reason: format!("{} is not open", self.params.port),
            })
        })?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| serial_error(e.to_string()))?;
        Ok(data.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_event_sink(&mut self, sink: Option<TransportEventSink>) {
        *self.sink.lock() = sink;
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cnc_ports() {
        assert!(is_controller_port("COM3"));
        assert!(is_controller_port("/dev/ttyUSB0"));
        assert!(is_controller_port("/dev/ttyACM1"));
        assert!(is_controller_port("/tmp/ttyGRBL"));
        assert!(is_controller_port("/dev/cu.usbmodem1421"));
        assert!(!is_controller_port("COM"));
        assert!(!is_controller_port("COMX"));
        assert!(!is_controller_port("/dev/ttyS0"));
    }

    #[test]
    fn test_port_info_from_non_usb_port() {
        let port = serialport::SerialPortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            port_type: serialport::SerialPortType::PciPort,
        };
        let info = SerialPortInfo::from(&port);
        assert_eq!(info.port_name, "/dev/ttyACM0");
        assert_eq!(info.description, "PCI");
        assert!(info.usb.is_none());
    }

    #[test]
    fn test_closed_transport_rejects_writes() {
        let mut transport = SerialTransport::new(ConnectionParams::serial("/dev/ttyUSB9", 115200));
        assert!(!transport.is_open());
        assert!(transport.write(b"?").is_err());
        assert_eq!(transport.info().connection_type, ConnectionType::Serial);
        assert_eq!(transport.options()["baudRate"], 115200);
    }

    #[test]
    fn test_invalid_data_bits_rejected() {
        let mut params = ConnectionParams::serial("/dev/ttyUSB9", 115200);
        params.data_bits = 9;
        let mut transport = SerialTransport::new(params);
        let err = transport.open().unwrap_err();
        assert!(err.to_string().contains("Invalid data bits"));
    }
}
