//! Data models for machine status, connections, and parse results
//!
//! This module provides:
//! - Machine state and status snapshots replaced on every status report
//! - Axis positions with optional rotary axes
//! - Connection records (`{ type, ident, options }` plus state)
//! - Session lifecycle states
//! - Typed parse results produced by the line-parser chains

pub mod response;

pub use response::{
    FirmwareInfo, HeaterReading, ParseResult, ParsedLine, PositionReport, ResultKind,
    TemperatureReport,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine state as reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MachineState {
    /// No status seen yet, or the session was torn down
    #[default]
    Unknown,
    /// Connected and idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold active
    Hold,
    /// Manual jog in progress
    Jog,
    /// Alarm lock (requires unlock or reset)
    Alarm,
    /// Safety door interlock triggered
    Door,
    /// Check mode (dry-run without machine movement)
    Check,
    /// Homing cycle in progress
    Home,
    /// Low-power sleep
    Sleep,
}

impl MachineState {
    /// Parse firmware state text such as `Idle`, `Hold:1` or `Door:0`
    ///
    /// Returns the state and the optional numeric sub-state after the colon.
    pub fn parse(text: &str) -> (Self, Option<u8>) {
        let text = text.trim();
        let (name, sub) = match text.split_once(':') {
            Some((name, sub)) => (name, sub.trim().parse::<u8>().ok()),
            None => (text, None),
        };

        let state = match name {
            s if s.starts_with("Idle") => MachineState::Idle,
            s if s.starts_with("Run") => MachineState::Run,
            s if s.starts_with("Hold") => MachineState::Hold,
            s if s.starts_with("Jog") => MachineState::Jog,
            s if s.starts_with("Alarm") => MachineState::Alarm,
            s if s.starts_with("Door") => MachineState::Door,
            s if s.starts_with("Check") => MachineState::Check,
            s if s.starts_with("Home") => MachineState::Home,
            s if s.starts_with("Sleep") => MachineState::Sleep,
            unknown => {
                tracing::warn!("Unknown machine state '{}'", unknown);
                MachineState::Unknown
            }
        };

        (state, sub)
    }

    /// Check if the machine accepts new motion commands in this state
    pub fn is_ready(&self) -> bool {
        matches!(self, MachineState::Idle | MachineState::Jog | MachineState::Sleep)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineState::Unknown => "Unknown",
            MachineState::Idle => "Idle",
            MachineState::Run => "Run",
            MachineState::Hold => "Hold",
            MachineState::Jog => "Jog",
            MachineState::Alarm => "Alarm",
            MachineState::Door => "Door",
            MachineState::Check => "Check",
            MachineState::Home => "Home",
            MachineState::Sleep => "Sleep",
        };
        write!(f, "{}", name)
    }
}

/// Axis position with optional rotary axes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// A-axis (4th axis) position
    pub a: Option<f64>,
    /// B-axis (5th axis) position
    pub b: Option<f64>,
    /// C-axis (6th axis) position
    pub c: Option<f64>,
}

impl Position {
    /// Create a three-axis position
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Parse a comma separated coordinate list (`0.000,1.5,-2`)
    ///
    /// At least three axes are required. Any field that is not a finite
    /// number rejects the whole position.
    pub fn parse(text: &str) -> Option<Self> {
        let mut coords = Vec::with_capacity(6);
        for field in text.split(',') {
            let value = field.trim().parse::<f64>().ok()?;
            if !value.is_finite() {
                return None;
            }
            coords.push(value);
        }

        if coords.len() < 3 || coords.len() > 6 {
            return None;
        }

        Some(Self {
            x: coords[0],
            y: coords[1],
            z: coords[2],
            a: coords.get(3).copied(),
            b: coords.get(4).copied(),
            c: coords.get(5).copied(),
        })
    }

    /// Subtract an offset axis by axis (machine position minus WCO)
    pub fn offset_by(&self, offset: &Position) -> Position {
        let sub = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => Some(a - b),
            (a, _) => a,
        };
        Position {
            x: self.x - offset.x,
            y: self.y - offset.y,
            z: self.z - offset.z,
            a: sub(self.a, offset.a),
            b: sub(self.b, offset.b),
            c: sub(self.c, offset.c),
        }
    }
}

/// Snapshot of the last known machine status
///
/// Replaced wholesale on every status report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Machine state
    pub state: MachineState,
    /// Sub-state code (e.g. `Hold:1`)
    pub sub_state: Option<u8>,
    /// Machine coordinates
    pub machine_position: Option<Position>,
    /// Work coordinates
    pub work_position: Option<Position>,
    /// Work coordinate offset
    pub work_offset: Option<Position>,
    /// Current feed rate
    pub feed_rate: Option<f64>,
    /// Current spindle speed
    pub spindle_speed: Option<f64>,
    /// Free planner blocks
    pub planner_buffer: Option<u32>,
    /// Free serial RX bytes
    pub rx_buffer: Option<u32>,
    /// Feed, rapid and spindle override percentages
    pub overrides: Option<(u32, u32, u32)>,
    /// Input pin states (`XYZPDHRS` letters)
    pub pins: Option<String>,
}

impl MachineStatus {
    /// The sentinel status a torn-down session reports
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Status carrying only a machine state
    pub fn with_state(state: MachineState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }
}

/// Transport family of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Serial/USB connection
    Serial,
    /// TCP socket connection
    Socket,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Socket => write!(f, "socket"),
        }
    }
}

/// Connected/disconnected flag of a connection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Transport is open
    Connected,
    /// Transport is closed or was never opened
    Disconnected,
}

/// The `{ type, ident, options }` triple carried by connection events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Transport family
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Port path or `host:port`
    pub ident: String,
    /// Transport options (baud rate, host, ...)
    pub options: serde_json::Value,
}

/// Connection record for one controller
///
/// Created on open and reset on close or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Transport family
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Port path or `host:port`
    pub ident: String,
    /// Transport options
    pub options: serde_json::Value,
    /// Connected flag
    pub state: ConnectionState,
    /// Last transport error, if any
    pub error: Option<String>,
}

impl Connection {
    /// Create a disconnected record from connection info
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            connection_type: info.connection_type,
            ident: info.ident,
            options: info.options,
            state: ConnectionState::Disconnected,
            error: None,
        }
    }

    /// The `{ type, ident, options }` triple of this record
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_type: self.connection_type,
            ident: self.ident.clone(),
            options: self.options.clone(),
        }
    }

    /// Mark the connection open and clear any previous error
    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.error = None;
    }

    /// Mark the connection closed
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Record a transport error and mark the connection closed
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.state = ConnectionState::Disconnected;
        self.error = Some(error.into());
    }

    /// Check whether the transport is open
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Lifecycle state of a controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, transport not open
    Closed,
    /// Handlers installed, transport opening
    Opening,
    /// Transport open, query timer running
    Open,
    /// Reset sent, transport closing
    Closing,
    /// Terminal: all owned resources released
    Destroyed,
}

impl SessionState {
    /// Check whether the session currently owns an open transport
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Opening | SessionState::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Closed => write!(f, "closed"),
            SessionState::Opening => write!(f, "opening"),
            SessionState::Open => write!(f, "open"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Destroyed => write!(f, "destroyed"),
        }
    }
}
