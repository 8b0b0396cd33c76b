//! cncwire Settings Crate
//!
//! Configuration file model for connections, sessions and the serial
//! bridge, with JSON/TOML persistence and validation.

pub mod config;
pub mod error;

pub use config::{BridgeSettings, Config, ConnectionSettings, SessionSettings};
pub use error::{SettingsError, SettingsResult};
