//! Controller session state machine
//!
//! A [`ControllerSession`] exclusively owns one transport. It turns inbound
//! bytes into `raw` line events, polls the controller with `?` while the
//! transport is open, and offers two outbound channels: buffered line
//! commands and realtime bytes.
//!
//! ```text
//! Closed -> Opening -> Open -> Closing -> Destroyed
//!              \________\_______________/
//!                 transport error / disconnect
//! ```
//!
//! Transport events are pumped through a tokio task, so `open()` must be
//! called from within a tokio runtime.

use super::realtime::RealtimeCommand;
use crate::communication::{Transport, TransportEvent};
use cncwire_core::{
    ConnectionInfo, ConnectionState, EventBus, MachineStatus, Result, SessionError, SessionEvent,
    SessionState,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Runtime behaviour of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between status queries
    pub query_interval: Duration,
    /// Send a soft reset right after opening
    pub reset_on_open: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            query_interval: Duration::from_millis(100),
            reset_on_open: true,
        }
    }
}

struct SessionInner {
    transport: Option<Box<dyn Transport>>,
    info: ConnectionInfo,
    state: SessionState,
    status: MachineStatus,
    waiting_queue: VecDeque<String>,
    ready_to_start: bool,
    line_buffer: Vec<u8>,
    query_timer: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// The owned transport, provided it is open
    fn live_transport(&mut self) -> Result<&mut Box<dyn Transport>> {
        let ident = self.info.ident.clone();
        match self.transport.as_mut() {
            None => Err(SessionError::Destroyed.into()),
            Some(transport) if !transport.is_open() => {
                Err(SessionError::NotOpen { ident }.into())
            }
            Some(transport) => Ok(transport),
        }
    }

    fn transport_is_open(&self) -> bool {
        self.transport
            .as_ref()
            .map(|transport| transport.is_open())
            .unwrap_or(false)
    }

    fn stop_query_timer(&mut self) {
        if let Some(timer) = self.query_timer.take() {
            timer.abort();
        }
    }
}

/// Longest unterminated line kept while waiting for `\n`
const MAX_LINE_LEN: usize = 4096;

/// Split complete lines off the front of the buffer
///
/// Lines are trimmed of trailing whitespace; empty lines are dropped.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let chunk: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&chunk[..pos]);
        let text = text.trim_end();
        if !text.is_empty() {
            lines.push(text.to_string());
        }
    }
    if buffer.len() > MAX_LINE_LEN {
        tracing::warn!(
            "Dropping {} bytes received without a line terminator",
            buffer.len()
        );
        buffer.clear();
    }
    lines
}

/// One connection to a controller
///
/// Cheap to clone; clones share the same state and event bus.
#[derive(Clone)]
pub struct ControllerSession {
    inner: Arc<Mutex<SessionInner>>,
    events: Arc<EventBus>,
    config: SessionConfig,
}

/// Non-owning reference to a session, for handlers and background tasks
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<Mutex<SessionInner>>,
    events: Weak<EventBus>,
    config: SessionConfig,
}

impl WeakSession {
    /// Get the session back if it is still alive
    pub fn upgrade(&self) -> Option<ControllerSession> {
        Some(ControllerSession {
            inner: self.inner.upgrade()?,
            events: self.events.upgrade()?,
            config: self.config.clone(),
        })
    }
}

impl ControllerSession {
    /// Create a closed session owning the given transport
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        Self::with_events(transport, config, Arc::new(EventBus::new()))
    }

    /// Create a closed session publishing on an existing bus
    pub fn with_events(
        transport: Box<dyn Transport>,
        config: SessionConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let info = transport.info();
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                transport: Some(transport),
                info,
                state: SessionState::Closed,
                status: MachineStatus::unknown(),
                waiting_queue: VecDeque::new(),
                ready_to_start: false,
                line_buffer: Vec::new(),
                query_timer: None,
            })),
            events,
            config,
        }
    }

    /// Non-owning handle to this session
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
            events: Arc::downgrade(&self.events),
            config: self.config.clone(),
        }
    }

    /// Open the transport and go live
    ///
    /// The event sink is installed before the transport opens and before the
    /// soft reset is written, so an immediate reply is not lost. Fails
    /// without changing state if the transport already reports itself open.
    pub fn open(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let info = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let ident = inner.info.ident.clone();

            if inner.state == SessionState::Destroyed {
                return Err(SessionError::Destroyed.into());
            }
            let Some(transport) = inner.transport.as_mut() else {
                return Err(SessionError::Destroyed.into());
            };
            if transport.is_open() {
                tracing::warn!(ident = %ident, "Open rejected: transport is already open");
                return Err(SessionError::AlreadyOpen { ident }.into());
            }

            inner.state = SessionState::Opening;
            let (tx, rx) = mpsc::unbounded_channel();
            transport.set_event_sink(Some(tx));

            if let Err(e) = transport.open() {
                transport.set_event_sink(None);
                inner.state = SessionState::Closed;
                let info = inner.info.clone();
                drop(guard);

                tracing::error!(ident = %ident, "Failed to open transport: {}", e);
                self.events.publish(SessionEvent::ConnectionError {
                    info,
                    error: e.to_string(),
                });
                return Err(e);
            }

            runtime.spawn(pump_transport_events(self.downgrade(), rx));

            if self.config.reset_on_open {
                if let Err(e) = transport.write(&[RealtimeCommand::SoftReset.as_byte()]) {
                    tracing::warn!(ident = %ident, "Failed to send soft reset: {}", e);
                }
            }

            inner.state = SessionState::Open;
            inner.stop_query_timer();
            inner.query_timer = Some(self.spawn_query_timer(&runtime));
            tracing::info!(ident = %ident, "Connection opened");
            inner.info.clone()
        };

        self.events.publish(SessionEvent::ConnectionOpen(info.clone()));
        self.events.publish(SessionEvent::ConnectionChange {
            info,
            state: ConnectionState::Connected,
        });
        Ok(())
    }

    /// Send a soft reset, close the transport and destroy the session
    ///
    /// Returns the transport's close error, if any, ahead of a destroy error.
    pub fn close(&self) -> Result<()> {
        let close_result = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let ident = inner.info.ident.clone();

            if inner.state == SessionState::Destroyed {
                return Err(SessionError::Destroyed.into());
            }
            let Some(transport) = inner.transport.as_mut() else {
                return Err(SessionError::Destroyed.into());
            };
            if !transport.is_open() {
                tracing::warn!(ident = %ident, "Close rejected: transport is not open");
                return Err(SessionError::NotOpen { ident }.into());
            }

            if let Err(e) = transport.write(&[RealtimeCommand::SoftReset.as_byte()]) {
                tracing::warn!(ident = %ident, "Failed to send soft reset: {}", e);
            }
            let result = transport.close();
            inner.state = SessionState::Closing;
            inner.stop_query_timer();
            result
        };

        let destroy_result = self.destroy();
        close_result?;
        destroy_result?;
        Ok(())
    }

    /// Tear the session down for good
    ///
    /// Idempotent. Refuses (and logs) while the transport still reports
    /// itself open. Otherwise resets the status to the unknown sentinel,
    /// drops the transport, cancels the query timer, empties the waiting
    /// queue and clears the ready gate.
    pub fn destroy(&self) -> std::result::Result<(), SessionError> {
        let (info, was_connected) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if inner.state == SessionState::Destroyed {
                return Ok(());
            }
            if inner.transport_is_open() {
                tracing::error!(
                    ident = %inner.info.ident,
                    "Refusing to destroy session while transport is open"
                );
                return Err(SessionError::StillOpen {
                    ident: inner.info.ident.clone(),
                });
            }

            if let Some(transport) = inner.transport.as_mut() {
                transport.set_event_sink(None);
            }
            inner.transport = None;
            inner.stop_query_timer();
            inner.status = MachineStatus::unknown();
            inner.waiting_queue.clear();
            inner.ready_to_start = false;
            inner.line_buffer.clear();

            let was_connected = matches!(
                inner.state,
                SessionState::Opening | SessionState::Open | SessionState::Closing
            );
            inner.state = SessionState::Destroyed;
            tracing::debug!(ident = %inner.info.ident, "Session destroyed");
            (inner.info.clone(), was_connected)
        };

        if was_connected {
            self.events.publish(SessionEvent::ConnectionChange {
                info: info.clone(),
                state: ConnectionState::Disconnected,
            });
        }
        self.events.publish(SessionEvent::ConnectionClose(info));
        Ok(())
    }

    /// Write a buffered line command (`<command>\n`)
    ///
    /// Each line is recorded in the waiting queue until acknowledged. Text
    /// with embedded newlines is sent as one command per non-empty line.
    pub fn send_command(&self, command: &str) -> Result<()> {
        let mut lines: Vec<&str> = command
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            lines.push("");
        }

        let mut inner = self.inner.lock();
        for line in lines {
            inner
                .live_transport()?
                .write(format!("{}\n", line).as_bytes())?;
            inner.waiting_queue.push_back(line.to_string());
            tracing::debug!(ident = %inner.info.ident, ">> {}", line);
        }
        Ok(())
    }

    /// Write realtime bytes as-is, with no terminator
    pub fn send_realtime_command(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.live_transport()?.write(bytes)?;
        Ok(())
    }

    /// Write one realtime command byte
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        self.send_realtime_command(&[command.as_byte()])
    }

    /// Start (or restart) status polling
    ///
    /// Each tick sends `?` if the transport is open; the first tick that
    /// finds it closed ends the timer.
    pub fn start_query_timer(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let mut inner = self.inner.lock();
        inner.live_transport()?;
        inner.stop_query_timer();
        inner.query_timer = Some(self.spawn_query_timer(&runtime));
        Ok(())
    }

    /// Cancel status polling
    pub fn stop_query_timer(&self) {
        self.inner.lock().stop_query_timer();
    }

    /// Check whether the session holds a query timer handle
    pub fn has_query_timer(&self) -> bool {
        self.inner.lock().query_timer.is_some()
    }

    /// Check whether the query timer is still running
    pub fn is_polling(&self) -> bool {
        self.inner
            .lock()
            .query_timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    fn spawn_query_timer(&self, runtime: &Handle) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let interval = self.config.query_interval.max(Duration::from_millis(1));

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let mut inner = inner.lock();
                let ident = inner.info.ident.clone();
                match inner.transport.as_mut() {
                    Some(transport) if transport.is_open() => {
                        if let Err(e) = transport.write(&[RealtimeCommand::StatusQuery.as_byte()])
                        {
                            tracing::warn!(ident = %ident, "Status query failed: {}", e);
                        }
                    }
                    _ => {
                        tracing::debug!(ident = %ident, "Transport closed, status polling stopped");
                        break;
                    }
                }
            }
        })
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Data(bytes) => {
                let lines = {
                    let mut inner = self.inner.lock();
                    if !inner.state.is_live() {
                        return;
                    }
                    inner.line_buffer.extend_from_slice(&bytes);
                    drain_lines(&mut inner.line_buffer)
                };
                for line in lines {
                    tracing::trace!("<< {}", line);
                    self.events.publish(SessionEvent::Raw { line });
                }
            }
            TransportEvent::Disconnect => {
                let Some(ident) = self.live_ident() else {
                    return;
                };
                tracing::warn!(ident = %ident, "Controller disconnected");
                self.teardown_after_fault();
            }
            TransportEvent::Error(reason) => {
                let Some(ident) = self.live_ident() else {
                    return;
                };
                tracing::error!(ident = %ident, error = %reason, "Transport error");
                self.events.publish(SessionEvent::ConnectionError {
                    info: self.info(),
                    error: reason,
                });
                self.teardown_after_fault();
            }
        }
    }

    fn live_ident(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner.state.is_live().then(|| inner.info.ident.clone())
    }

    fn teardown_after_fault(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stop_query_timer();
            if let Some(transport) = inner.transport.as_mut() {
                if transport.is_open() {
                    if let Err(e) = transport.close() {
                        tracing::warn!("Failed to close faulted transport: {}", e);
                    }
                }
            }
        }
        if let Err(e) = self.destroy() {
            tracing::error!("Session teardown failed: {}", e);
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Check whether the session is live with an open transport
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == SessionState::Open && inner.transport_is_open()
    }

    /// Last known machine status
    pub fn status(&self) -> MachineStatus {
        self.inner.lock().status.clone()
    }

    /// Replace the machine status and publish it
    pub fn update_status(&self, status: MachineStatus) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Destroyed {
                return;
            }
            inner.status = status.clone();
        }
        self.events.publish(SessionEvent::StatusChanged(status));
    }

    /// Pop the oldest command awaiting acknowledgment
    pub fn acknowledge(&self) -> Option<String> {
        self.inner.lock().waiting_queue.pop_front()
    }

    /// Commands awaiting acknowledgment, oldest first
    pub fn waiting_queue(&self) -> Vec<String> {
        self.inner.lock().waiting_queue.iter().cloned().collect()
    }

    /// Forget every command awaiting acknowledgment
    pub fn clear_waiting_queue(&self) {
        self.inner.lock().waiting_queue.clear();
    }

    /// Check the ready gate
    pub fn is_ready_to_start(&self) -> bool {
        self.inner.lock().ready_to_start
    }

    /// Set the ready gate
    pub fn set_ready_to_start(&self, ready: bool) {
        self.inner.lock().ready_to_start = ready;
    }

    /// The `{ type, ident, options }` triple of the owned transport
    pub fn info(&self) -> ConnectionInfo {
        self.inner.lock().info.clone()
    }

    /// The session's event bus
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Runtime configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ControllerSession")
            .field("ident", &inner.info.ident)
            .field("state", &inner.state)
            .field("waiting", &inner.waiting_queue.len())
            .field("ready_to_start", &inner.ready_to_start)
            .finish()
    }
}

async fn pump_transport_events(
    session: WeakSession,
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        session.handle_transport_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_lines() {
        let mut buffer = b"ok\r\n\n  \nGrbl 1.1h ['$' for help]\r\n<Idle".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["ok", "Grbl 1.1h ['$' for help]"]);
        assert_eq!(buffer, b"<Idle");

        buffer.extend_from_slice(b"|MPos:0,0,0>\n");
        assert_eq!(drain_lines(&mut buffer), vec!["<Idle|MPos:0,0,0>"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unterminated_noise_is_bounded() {
        let mut buffer = vec![b'x'; MAX_LINE_LEN];
        assert!(drain_lines(&mut buffer).is_empty());
        assert_eq!(buffer.len(), MAX_LINE_LEN);

        buffer.push(b'x');
        assert!(drain_lines(&mut buffer).is_empty());
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"ok\n");
        assert_eq!(drain_lines(&mut buffer), vec!["ok"]);
    }

    #[test]
    fn test_open_requires_runtime() {
        let (transport, _handle) = crate::communication::LoopbackTransport::new("sim");
        let session = ControllerSession::new(Box::new(transport), SessionConfig::default());
        let err = session.open().unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.query_interval, Duration::from_millis(100));
        assert!(config.reset_on_open);
    }
}
