//! In-memory transport
//!
//! [`LoopbackTransport`] is the transport a session owns; the paired
//! [`LoopbackHandle`] plays the controller side. It records every byte the
//! session writes and injects inbound data, disconnects and faults. Used by
//! the simulator and by tests.

use super::{Transport, TransportEvent, TransportEventSink};
use cncwire_core::{ConnectionError, ConnectionType, Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct LoopbackState {
    open: bool,
    fail_open: Option<String>,
    fail_close: Option<String>,
    written: Vec<Vec<u8>>,
    sink: Option<TransportEventSink>,
    sink_installs: usize,
    open_count: usize,
}

impl LoopbackState {
    fn emit(&self, event: TransportEvent) -> bool {
        match &self.sink {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }
}

/// Session side of an in-memory transport
pub struct LoopbackTransport {
    ident: String,
    state: Arc<Mutex<LoopbackState>>,
}

/// Controller side of an in-memory transport
#[derive(Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    /// Create a closed transport and its controller-side handle
    pub fn new(ident: impl Into<String>) -> (Self, LoopbackHandle) {
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        (
            Self {
                ident: ident.into(),
                state: state.clone(),
            },
            LoopbackHandle { state },
        )
    }
}

impl Transport for LoopbackTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Serial
    }

    fn ident(&self) -> String {
        self.ident.clone()
    }

    fn options(&self) -> serde_json::Value {
        serde_json::json!({ "loopback": true })
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_open.take() {
            return Err(ConnectionError::FailedToOpen {
                port: self.ident.clone(),
                reason,
            }
            .into());
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_close.take() {
            return Err(Error::from(ConnectionError::IoError { reason }));
        }
        state.open = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(ConnectionError::IoError {
                reason: format!("{} is not open", self.ident),
            }
            .into());
        }
        state.written.push(data.to_vec());
        Ok(data.len())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn set_event_sink(&mut self, sink: Option<TransportEventSink>) {
        let mut state = self.state.lock();
        if sink.is_some() {
            state.sink_installs += 1;
        }
        state.sink = sink;
    }
}

impl LoopbackHandle {
    /// Deliver inbound bytes to the session
    ///
    /// Returns false when no sink is installed.
    pub fn inject(&self, bytes: impl AsRef<[u8]>) -> bool {
        self.state
            .lock()
            .emit(TransportEvent::Data(bytes.as_ref().to_vec()))
    }

    /// Deliver one newline-terminated line
    pub fn inject_line(&self, line: &str) -> bool {
        self.inject(format!("{}\n", line))
    }

    /// Simulate the device going away
    pub fn disconnect(&self) -> bool {
        let mut state = self.state.lock();
        state.open = false;
        state.emit(TransportEvent::Disconnect)
    }

    /// Report a transport fault; the device stays open
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.state
            .lock()
            .emit(TransportEvent::Error(message.into()))
    }

    /// Force the open flag
    pub fn set_open(&self, open: bool) {
        self.state.lock().open = open;
    }

    /// Make the next `open()` fail with the given reason
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().fail_open = Some(reason.into());
    }

    /// Make the next `close()` fail with the given reason
    pub fn fail_next_close(&self, reason: impl Into<String>) {
        self.state.lock().fail_close = Some(reason.into());
    }

    /// Every write the session made, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// All written bytes concatenated as text
    pub fn written_text(&self) -> String {
        let state = self.state.lock();
        String::from_utf8_lossy(&state.written.concat()).into_owned()
    }

    /// Drain the write log
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// How many times an event sink was installed
    pub fn sink_installs(&self) -> usize {
        self.state.lock().sink_installs
    }

    /// Whether an event sink is currently installed
    pub fn has_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// How many times the transport was opened
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Check the open flag
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}
