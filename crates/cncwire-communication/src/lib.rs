//! # cncwire Communication
//!
//! Transports, firmware line parsers, the command queue, and the controller
//! session state machine. Supports serial/USB and TCP connections plus an
//! in-memory loopback for simulation. Grbl and Cirqoid dialects.

pub mod communication;
pub mod controller;
pub mod firmware;

pub use communication::{
    list_ports, CommandQueue, ConnectionDriver, ConnectionParams, ListenerId, LoopbackHandle,
    LoopbackTransport, SerialParity, SerialPortInfo, SerialTransport, TcpTransport, Transport,
    TransportEvent, TransportEventSink, UsbIdentity,
};
pub use controller::{Controller, ControllerSession, RealtimeCommand, SessionConfig, WeakSession};
pub use firmware::{Dialect, LineRule, ParserFacade};
