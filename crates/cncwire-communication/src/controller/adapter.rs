//! Dialect controller
//!
//! Glues a [`ControllerSession`] to a dialect's parser chain and a command
//! queue. Every `raw` line is parsed and republished as a typed `line`
//! event; status reports replace the session status; acknowledgments drive
//! the queue forward one command at a time.

use super::realtime::RealtimeCommand;
use super::session::{ControllerSession, SessionConfig, WeakSession};
use crate::communication::{CommandQueue, Transport};
use crate::firmware::{Dialect, ParserFacade};
use cncwire_core::{
    Connection, ConnectionState, EventBus, EventCategory, EventFilter, MachineStatus, ParseResult,
    ParsedLine, Position, Result, SessionEvent, SubscriptionId,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

type SharedQueue = Arc<Mutex<CommandQueue<String>>>;

/// A controller of one firmware dialect
pub struct Controller {
    dialect: Dialect,
    session: ControllerSession,
    queue: SharedQueue,
    connection: Arc<RwLock<Connection>>,
    subscriptions: Vec<SubscriptionId>,
}

impl Controller {
    /// Create a closed controller owning the given transport
    pub fn new(dialect: Dialect, transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let session = ControllerSession::new(transport, config);
        let events = session.events();
        let parser = Arc::new(dialect.parser());
        let connection = Arc::new(RwLock::new(Connection::new(session.info())));

        let queue: SharedQueue = Arc::new(Mutex::new(CommandQueue::new()));
        let weak = session.downgrade();
        queue.lock().on_data(move |command: &String| {
            if let Some(session) = weak.upgrade() {
                if let Err(e) = session.send_command(command) {
                    tracing::warn!("Failed to send queued command {:?}: {}", command, e);
                }
            }
        });

        let subscriptions = vec![
            Self::track_connection(&events, connection.clone()),
            Self::handle_lines(&events, session.downgrade(), parser, queue.clone()),
        ];

        Self {
            dialect,
            session,
            queue,
            connection,
            subscriptions,
        }
    }

    fn track_connection(events: &EventBus, connection: Arc<RwLock<Connection>>) -> SubscriptionId {
        events.subscribe(
            EventFilter::Categories(vec![EventCategory::Connection]),
            move |event| {
                let mut connection = connection.write();
                match event {
                    SessionEvent::ConnectionOpen(_) => connection.mark_connected(),
                    SessionEvent::ConnectionChange { state, .. } => match state {
                        ConnectionState::Connected => connection.mark_connected(),
                        ConnectionState::Disconnected => connection.mark_disconnected(),
                    },
                    SessionEvent::ConnectionError { error, .. } => connection.mark_error(error.clone()),
                    SessionEvent::ConnectionClose(_) => connection.mark_disconnected(),
                    _ => {}
                }
            },
        )
    }

    fn handle_lines(
        events: &EventBus,
        session: WeakSession,
        parser: Arc<ParserFacade>,
        queue: SharedQueue,
    ) -> SubscriptionId {
        events.subscribe(
            EventFilter::Categories(vec![EventCategory::Data]),
            move |event| {
                let SessionEvent::Raw { line } = event else {
                    return;
                };
                let Some(session) = session.upgrade() else {
                    return;
                };

                let result = parser.parse(line);
                react(&session, &queue, &result);
                session.events().publish(SessionEvent::Line(result));
            },
        )
    }

    /// Open the transport
    pub fn open(&self) -> Result<()> {
        self.session.open()
    }

    /// Stop the queue and close the transport
    pub fn close(&self) -> Result<()> {
        self.queue.lock().stop();
        self.session.close()
    }

    /// Write a buffered line command
    pub fn send_command(&self, command: &str) -> Result<()> {
        self.session.send_command(command)
    }

    /// Write realtime bytes as-is
    pub fn send_realtime_command(&self, bytes: &[u8]) -> Result<()> {
        self.session.send_realtime_command(bytes)
    }

    /// Write one realtime command
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        self.session.send_realtime(command)
    }

    /// Append program lines to the queue, skipping blank lines
    pub fn load<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut queue = self.queue.lock();
        queue.push_all(
            lines
                .into_iter()
                .map(|line| line.as_ref().trim().to_string())
                .filter(|line| !line.is_empty()),
        );
        tracing::debug!("Queue holds {} commands", queue.len());
    }

    /// Drop every queued command
    pub fn clear_queue(&self) {
        self.queue.lock().clear();
    }

    /// Start or resume streaming the queue
    ///
    /// Nothing is sent until the firmware has announced itself; the first
    /// command then goes out as soon as the banner arrives.
    pub fn play(&self, looping: bool) {
        self.queue.lock().arm(looping);
        if !self.session.is_ready_to_start() {
            tracing::info!("Controller not ready yet, streaming starts after the banner");
        }
        advance(&self.session, &self.queue);
    }

    /// Stop streaming after the command in flight
    pub fn pause(&self) {
        self.queue.lock().pause();
    }

    /// Stop streaming and rewind to the first command
    pub fn stop(&self) {
        self.queue.lock().stop();
    }

    /// Restart streaming from the first command
    pub fn replay(&self, looping: bool) {
        self.queue.lock().stop();
        self.play(looping);
    }

    /// Feed hold
    pub fn feed_hold(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::FeedHold)
    }

    /// Cycle start / resume
    pub fn cycle_start(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::CycleStart)
    }

    /// Soft reset the firmware
    ///
    /// Stops the queue and forgets unacknowledged commands; the gate
    /// reopens when the firmware announces itself again.
    pub fn reset(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::SoftReset)?;
        self.queue.lock().stop();
        self.session.clear_waiting_queue();
        self.session.set_ready_to_start(false);
        Ok(())
    }

    /// Snapshot of the connection record
    pub fn connection(&self) -> Connection {
        self.connection.read().clone()
    }

    /// The session's event bus
    pub fn events(&self) -> Arc<EventBus> {
        self.session.events()
    }

    /// The underlying session
    pub fn session(&self) -> &ControllerSession {
        &self.session
    }

    /// Firmware dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Last known machine status
    pub fn status(&self) -> MachineStatus {
        self.session.status()
    }

    /// Dispatched and total queue items
    pub fn queue_progress(&self) -> (usize, usize) {
        let queue = self.queue.lock();
        (queue.executed(), queue.len())
    }

    /// Check if the queue is stopped or paused
    pub fn is_queue_stopped(&self) -> bool {
        self.queue.lock().is_stopped()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let events = self.session.events();
        for id in self.subscriptions.drain(..) {
            events.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("dialect", &self.dialect)
            .field("session", &self.session)
            .field("queue", &self.queue_progress())
            .finish()
    }
}

/// Dispatch the next queued command if the firmware is ready for it
///
/// One command is in flight at a time: nothing is sent while earlier
/// commands still await acknowledgment.
fn advance(session: &ControllerSession, queue: &Mutex<CommandQueue<String>>) {
    if !session.is_ready_to_start() || !session.waiting_queue().is_empty() {
        return;
    }

    let progress = {
        let mut queue = queue.lock();
        queue.next().map(|_| (queue.executed(), queue.len()))
    };
    if let Some((executed, total)) = progress {
        session
            .events()
            .publish(SessionEvent::QueueProgress { executed, total });
    }
}

fn react(session: &ControllerSession, queue: &Mutex<CommandQueue<String>>, result: &ParseResult) {
    match &result.line {
        ParsedLine::Status(report) => {
            let mut status = report.clone();
            if status.work_offset.is_none() {
                status.work_offset = session.status().work_offset;
            }
            if status.work_position.is_none() {
                if let (Some(mpos), Some(wco)) = (status.machine_position, status.work_offset) {
                    status.work_position = Some(mpos.offset_by(&wco));
                }
            }
            session.update_status(status);
        }
        ParsedLine::Position(report) => {
            let mut status = session.status();
            status.machine_position = Some(Position::new(report.x, report.y, report.z));
            session.update_status(status);
        }
        ParsedLine::Startup { .. } => {
            session.clear_waiting_queue();
            session.set_ready_to_start(true);

            // A banner after dispatching means the firmware lost the program.
            let interrupted = {
                let mut queue = queue.lock();
                let (executed, total) = (queue.executed(), queue.len());
                if executed > 0 {
                    queue.stop();
                }
                (executed > 0 && executed < total).then_some((executed, total))
            };
            match interrupted {
                Some((executed, total)) => tracing::warn!(
                    executed,
                    total,
                    "Controller reset mid-program, queue stopped: {}",
                    result.raw.trim()
                ),
                None => {
                    tracing::info!("Controller ready: {}", result.raw.trim());
                    advance(session, queue);
                }
            }
        }
        ParsedLine::Firmware(_) => {
            tracing::info!("Controller identified: {}", result.raw.trim());
            session.set_ready_to_start(true);
            advance(session, queue);
        }
        ParsedLine::Error { code, message } => {
            let command = session.acknowledge();
            tracing::warn!(code = ?code, command = ?command, "Command rejected: {}", message);
            queue.lock().pause();
        }
        ParsedLine::Alarm { code, message } => {
            tracing::error!(code = ?code, "Alarm: {}", message);
            queue.lock().pause();
        }
        line if line.is_ack() => {
            session.acknowledge();
            advance(session, queue);
        }
        _ => {}
    }
}
