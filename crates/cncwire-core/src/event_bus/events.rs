//! Event type definitions for the session event bus.

use serde::{Deserialize, Serialize};

use crate::data::{ConnectionInfo, ConnectionState, MachineStatus, ParseResult};

/// Events published by a controller session and its dialect adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Non-empty inbound line, trailing whitespace trimmed
    Raw {
        /// The line text
        line: String,
    },
    /// Inbound line after the dialect parser chain
    Line(ParseResult),
    /// Transport opened and handlers installed
    ConnectionOpen(ConnectionInfo),
    /// Connected flag changed
    ConnectionChange {
        /// Connection triple
        info: ConnectionInfo,
        /// New connected flag
        state: ConnectionState,
    },
    /// Transport reported a fault or failed to open
    ConnectionError {
        /// Connection triple
        info: ConnectionInfo,
        /// Error description
        error: String,
    },
    /// Session torn down
    ConnectionClose(ConnectionInfo),
    /// Machine status replaced by a new report
    StatusChanged(MachineStatus),
    /// Command queue dispatched an item
    QueueProgress {
        /// Items dispatched in the current pass
        executed: usize,
        /// Items in the queue
        total: usize,
    },
}

impl SessionEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            SessionEvent::Raw { .. } => EventCategory::Data,
            SessionEvent::Line(_) => EventCategory::Protocol,
            SessionEvent::ConnectionOpen(_)
            | SessionEvent::ConnectionChange { .. }
            | SessionEvent::ConnectionError { .. }
            | SessionEvent::ConnectionClose(_) => EventCategory::Connection,
            SessionEvent::StatusChanged(_) => EventCategory::Status,
            SessionEvent::QueueProgress { .. } => EventCategory::Queue,
        }
    }

    /// Get the wire-style event name (`connection:open`, `raw`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Raw { .. } => "raw",
            SessionEvent::Line(_) => "line",
            SessionEvent::ConnectionOpen(_) => "connection:open",
            SessionEvent::ConnectionChange { .. } => "connection:change",
            SessionEvent::ConnectionError { .. } => "connection:error",
            SessionEvent::ConnectionClose(_) => "connection:close",
            SessionEvent::StatusChanged(_) => "status",
            SessionEvent::QueueProgress { .. } => "queue:progress",
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Connection lifecycle events.
    Connection,
    /// Raw inbound lines.
    Data,
    /// Parsed protocol lines.
    Protocol,
    /// Machine status updates.
    Status,
    /// Command queue progress.
    Queue,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Data => write!(f, "Data"),
            EventCategory::Protocol => write!(f, "Protocol"),
            EventCategory::Status => write!(f, "Status"),
            EventCategory::Queue => write!(f, "Queue"),
        }
    }
}
