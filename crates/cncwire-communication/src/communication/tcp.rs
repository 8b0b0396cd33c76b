//! TCP socket transport
//!
//! Network-attached controllers and serial-to-TCP bridges. The identifier of
//! a socket connection is `host:port`.

use super::{
    is_disconnect_error, is_idle_error, ConnectionDriver, ConnectionParams, Transport,
    TransportEvent, TransportEventSink,
};
use cncwire_core::{ConnectionError, ConnectionType, Error, Result};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const READ_POLL: Duration = Duration::from_millis(50);

fn tcp_error(reason: impl Into<String>) -> Error {
    ConnectionError::TcpError {
        reason: reason.into(),
    }
    .into()
}

/// TCP transport backed by a blocking socket and a reader thread
pub struct TcpTransport {
    params: ConnectionParams,
    stream: Option<TcpStream>,
    sink: Arc<Mutex<Option<TransportEventSink>>>,
    open: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a closed TCP transport
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            stream: None,
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

    fn connect(&self) -> Result<TcpStream> {
        let ident = self.ident();
        let timeout = Duration::from_millis(self.params.timeout_ms.max(1));
        let addrs = (self.params.port.as_str(), self.params.network_port)
            .to_socket_addrs()
            .map_err(|e| {
                Error::from(ConnectionError::FailedToOpen {
                    port: ident.clone(),
                    reason: e.to_string(),
                })
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(ConnectionError::FailedToOpen {
            port: ident,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string()),
        }
        .into())
    }

    fn join_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                tracing::warn!(ident = %self.ident(), "TCP reader thread panicked");
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
    mut stream: TcpStream,
    sink: Arc<Mutex<Option<TransportEventSink>>>,
    open: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 4096];
    while !stop.load(Ordering::SeqCst) {
        let event = match stream.read(&mut buf) {
            Ok(0) => TransportEvent::Disconnect,
            Ok(n) => {
                emit(&sink, TransportEvent::Data(buf[..n].to_vec()));
                continue;
            }
            Err(e) if is_idle_error(&e) => continue,
            Err(e) if is_disconnect_error(&e) => TransportEvent::Disconnect,
            Err(e) => TransportEvent::Error(e.to_string()),
        };

        open.store(false, Ordering::SeqCst);
        if !stop.load(Ordering::SeqCst) {
            emit(&sink, event);
        }
        break;
    }
}

impl Transport for TcpTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Socket
    }

    fn ident(&self) -> String {
        format!("{}:{}", self.params.port, self.params.network_port)
    }

    fn options(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.params.port,
            "port": self.params.network_port,
            "timeoutMs": self.params.timeout_ms,
        })
    }

    fn open(&mut self) -> Result<()> {
        if self.params.driver != ConnectionDriver::Tcp {
            return Err(ConnectionError::InvalidParameters {
                reason: "TcpTransport requires Tcp driver type".to_string(),
            }
            .into());
        }
        if self.is_open() {
            return Err(ConnectionError::FailedToOpen {
                port: self.ident(),
                reason: "already open".to_string(),
            }
            .into());
        }
        self.join_reader();

        let stream = self.connect()?;
        stream
            .set_nodelay(true)
            .and_then(|_| stream.set_read_timeout(Some(READ_POLL)))
            .map_err(|e| tcp_error(format!("Failed to configure socket: {}", e)))?;
        let reader_stream = stream
            .try_clone()
            .map_err(|e| tcp_error(format!("Failed to clone socket: {}", e)))?;

        self.stop.store(false, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);

        let sink = self.sink.clone();
        let open = self.open.clone();
        let stop = self.stop.clone();
        let reader = std::thread::Builder::new()
            .name(format!("tcp-reader:{}", self.ident()))
            .spawn(move || read_loop(reader_stream, sink, open, stop))
            .map_err(|e| tcp_error(format!("Failed to spawn reader thread: {}", e)))?;

        self.stream = Some(stream);
        self.reader = Some(reader);
        tracing::info!(ident = %self.ident(), "TCP connection opened");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);

        let result = match self.stream.take() {
            Some(stream) => match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != std::io::ErrorKind::NotConnected => {
                    Err(tcp_error(format!("Failed to shut down socket: {}", e)))
                }
                _ => Ok(()),
            },
            None => Ok(()),
        };
        self.join_reader();

        tracing::info!(ident = %self.ident(), "TCP connection closed");
        result
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let ident = self.ident();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| tcp_error(format!("{} is not open", ident)))?;
        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|e| tcp_error(e.to_string()))?;
        Ok(data.len())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn set_event_sink(&mut self, sink: Option<TransportEventSink>) {
        *self.sink.lock() = sink;
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.join_reader();
    }
}
