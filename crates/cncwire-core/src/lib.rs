//! # cncwire Core
//!
//! Core types, errors, and the per-session event bus shared by the
//! cncwire protocol and transport crates.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{
    Connection, ConnectionInfo, ConnectionState, ConnectionType, FirmwareInfo, HeaterReading,
    MachineState, MachineStatus, ParseResult, ParsedLine, Position, PositionReport, ResultKind,
    SessionState, TemperatureReport,
};

pub use error::{ConnectionError, Error, ProtocolError, Result, SessionError};

pub use event_bus::{EventBus, EventCategory, EventFilter, SessionEvent, SubscriptionId};
