//! Error taxonomy: session guard violations, transport faults, and line
//! protocol problems, folded into [`Error`].

use thiserror::Error;

/// Session error type
///
/// Guard violations on the controller session lifecycle. These are caller
/// errors, not transient faults: the session state is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Transport is already open
    #[error("Cannot open {ident}: transport is already open")]
    AlreadyOpen {
        /// Transport identifier (port path or host:port).
        ident: String,
    },

    /// Transport is not open
    #[error("Cannot use {ident}: transport is not open")]
    NotOpen {
        /// Transport identifier (port path or host:port).
        ident: String,
    },

    /// Session was destroyed and owns no transport anymore
    #[error("Session has been destroyed")]
    Destroyed,

    /// Transport still reports itself open
    #[error("Cannot destroy session while {ident} is still open")]
    StillOpen {
        /// Transport identifier (port path or host:port).
        ident: String,
    },

    /// No tokio runtime available to drive timers and event delivery
    #[error("Session requires a running tokio runtime")]
    NoRuntime,
}

/// Transport faults raised by serial, TCP, or in-memory transports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Opening the device or socket failed
    #[error("Could not open {port}: {reason}")]
    FailedToOpen {
        /// Device path or host:port
        port: String,
        /// Cause reported by the OS
        reason: String,
    },

    /// The peer went away while open
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Cause reported by the OS
        reason: String,
    },

    /// Serial driver failure
    #[error("Serial port error: {reason}")]
    SerialError {
        /// Driver message
        reason: String,
    },

    /// Socket failure
    #[error("TCP error: {reason}")]
    TcpError {
        /// Socket message
        reason: String,
    },

    /// Read or write failure on an open transport
    #[error("Transport I/O failed: {reason}")]
    IoError {
        /// Cause reported by the OS
        reason: String,
    },

    /// Parameters that can never produce a connection
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// What is wrong with them
        reason: String,
    },

    /// Anything else
    #[error("{message}")]
    Other {
        /// Free-form message
        message: String,
    },
}

/// Line protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A line matched a rule but its payload was unusable
    #[error("Malformed firmware line: {reason}")]
    ResponseParseError {
        /// What was wrong with the line
        reason: String,
    },

    /// No parser chain exists for the dialect
    #[error("Unsupported controller dialect: {dialect}")]
    UnsupportedDialect {
        /// Name as requested
        dialect: String,
    },
}

/// Umbrella error returned by session and transport APIs
#[derive(Error, Debug)]
pub enum Error {
    /// Lifecycle guard violation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Transport fault
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Line protocol problem
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Raw I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Free-form error from a message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Whether this is a lifecycle guard violation
    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    /// Whether this came from the transport
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }
}

/// Result alias over [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
