//! Typed results of the firmware line parsers
//!
//! Every inbound line maps to exactly one [`ParseResult`]. The payload is a
//! closed enum; lines that no rule recognises map to
//! [`ParsedLine::Unrecognized`] instead of an error.

use super::MachineStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed tag identifying which rule matched a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    /// Firmware identification (`FIRMWARE_NAME:...`)
    Firmware,
    /// Boot banner (`start`, `Grbl 1.1h ['$' for help]`)
    Startup,
    /// Axis position report (`X:0.00 Y:0.00 Z:0.00`)
    Position,
    /// Heater temperatures, optionally combined with an ack
    Temperature,
    /// Command acknowledgment
    Ok,
    /// Firmware echo message
    Echo,
    /// Command error
    Error,
    /// Realtime status report (`<Idle|MPos:...>`)
    Status,
    /// Alarm
    Alarm,
    /// G-code parser modal state (`[GC:...]`)
    ParserState,
    /// Stored parameter (`[G54:...]`, `[PRB:...]`)
    Parameters,
    /// Feedback message (`[MSG:...]`)
    Feedback,
    /// Firmware setting (`$N=value`)
    Setting,
    /// No rule matched
    Unrecognized,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Firmware identification fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    /// Firmware name (`Cirqoid`, `Marlin 1.1.0`)
    pub firmware_name: String,
    /// Host protocol version
    pub protocol_version: Option<String>,
    /// Machine kinematics (`Cartesian`)
    pub machine_type: Option<String>,
    /// Number of extruders / tool heads
    pub extruder_count: Option<u32>,
    /// Board UUID
    pub uuid: Option<String>,
}

/// Axis position report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// Extruder / auxiliary axis position
    pub e: Option<f64>,
}

/// Current and target reading of one heater
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeaterReading {
    /// Measured temperature
    pub current: f64,
    /// Target temperature
    pub target: Option<f64>,
}

/// Heater temperature report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReport {
    /// The line also acknowledged a command (`ok T:...`)
    pub ok: bool,
    /// Tool / extruder heater
    pub extruder: HeaterReading,
    /// Bed heater
    pub bed: Option<HeaterReading>,
}

/// Variant-specific payload of a parsed line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParsedLine {
    /// Firmware identification
    Firmware(FirmwareInfo),
    /// Boot banner
    Startup {
        /// Firmware family, when the banner names one
        firmware: Option<String>,
        /// Firmware version, when the banner carries one
        version: Option<String>,
        /// Rest of the banner
        message: String,
    },
    /// Axis position report
    Position(PositionReport),
    /// Heater temperatures
    Temperature(TemperatureReport),
    /// Command acknowledgment
    Ok,
    /// Firmware echo message
    Echo {
        /// Echoed text
        message: String,
    },
    /// Command error
    Error {
        /// Numeric error code, when the firmware sends one
        code: Option<u16>,
        /// Error text or decoded description
        message: String,
    },
    /// Realtime status report
    Status(MachineStatus),
    /// Alarm
    Alarm {
        /// Numeric alarm code, when the firmware sends one
        code: Option<u16>,
        /// Alarm text or decoded description
        message: String,
    },
    /// G-code parser modal state
    ParserState {
        /// Modal words (`G0`, `G54`, `M5`, ...)
        modal: Vec<String>,
        /// Active tool
        tool: Option<u32>,
        /// Programmed feed rate
        feed_rate: Option<f64>,
        /// Programmed spindle speed
        spindle_speed: Option<f64>,
    },
    /// Stored parameter
    Parameters {
        /// Parameter name (`G54`, `TLO`, `PRB`)
        name: String,
        /// Raw parameter value
        value: String,
    },
    /// Feedback message
    Feedback {
        /// Message text
        message: String,
    },
    /// Firmware setting
    Setting {
        /// Setting number
        number: u16,
        /// Setting value as sent
        value: String,
        /// Inline description, if any
        description: Option<String>,
    },
    /// No rule matched
    Unrecognized,
}

impl ParsedLine {
    /// The closed tag of this payload
    pub fn kind(&self) -> ResultKind {
        match self {
            ParsedLine::Firmware(_) => ResultKind::Firmware,
            ParsedLine::Startup { .. } => ResultKind::Startup,
            ParsedLine::Position(_) => ResultKind::Position,
            ParsedLine::Temperature(_) => ResultKind::Temperature,
            ParsedLine::Ok => ResultKind::Ok,
            ParsedLine::Echo { .. } => ResultKind::Echo,
            ParsedLine::Error { .. } => ResultKind::Error,
            ParsedLine::Status(_) => ResultKind::Status,
            ParsedLine::Alarm { .. } => ResultKind::Alarm,
            ParsedLine::ParserState { .. } => ResultKind::ParserState,
            ParsedLine::Parameters { .. } => ResultKind::Parameters,
            ParsedLine::Feedback { .. } => ResultKind::Feedback,
            ParsedLine::Setting { .. } => ResultKind::Setting,
            ParsedLine::Unrecognized => ResultKind::Unrecognized,
        }
    }

    /// Check if this line acknowledges a buffered command
    pub fn is_ack(&self) -> bool {
        match self {
            ParsedLine::Ok => true,
            ParsedLine::Temperature(report) => report.ok,
            _ => false,
        }
    }
}

/// A parsed line together with the line it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Typed payload
    pub line: ParsedLine,
    /// The line as handed to the parser
    pub raw: String,
}

impl ParseResult {
    /// Tag a payload with its source line
    pub fn new(line: ParsedLine, raw: impl Into<String>) -> Self {
        Self {
            line,
            raw: raw.into(),
        }
    }

    /// Result for a line no rule recognised
    pub fn unrecognized(raw: impl Into<String>) -> Self {
        Self::new(ParsedLine::Unrecognized, raw)
    }

    /// The closed tag of this result
    pub fn kind(&self) -> ResultKind {
        self.line.kind()
    }
}
