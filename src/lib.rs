//! # cncwire
//!
//! Line-protocol sessions for CNC controller firmware.
//!
//! ## Architecture
//!
//! cncwire is organized as a workspace with multiple crates:
//!
//! 1. **cncwire-core** - Errors, data model, and the per-session event bus
//! 2. **cncwire-communication** - Transports, line parsers, command queue, controller sessions
//! 3. **cncwire-settings** - JSON/TOML configuration
//! 4. **cncwire** - Logging setup, controller construction from settings, and the
//!    `serial-bridge` binary
//!
//! ## Features
//!
//! - **Dialects**: Grbl (status reports, acks, errors, alarms) and Cirqoid/Marlin-style
//! - **Transports**: Serial/USB, TCP, and an in-memory loopback for tests
//! - **Two send paths**: buffered line commands and realtime control bytes
//! - **Serial bridge**: a virtual serial device piped to a local TCP port

pub mod bridge;

pub use cncwire_communication::{
    CommandQueue, ConnectionDriver, ConnectionParams, Controller, ControllerSession, Dialect,
    LoopbackHandle, LoopbackTransport, ParserFacade, RealtimeCommand, SerialTransport,
    SessionConfig, TcpTransport, Transport,
};
pub use cncwire_core::{
    Connection, ConnectionState, ConnectionType, Error, EventBus, EventCategory, EventFilter,
    MachineState, MachineStatus, ParseResult, ParsedLine, Position, Result, ResultKind,
    SessionEvent, SessionState,
};
pub use cncwire_settings::{Config, SettingsError};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Environment variable selecting the log output format
pub const LOG_FORMAT_ENV: &str = "CNCWIRE_LOG_FORMAT";

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, INFO when unset
/// - Human readable output on stderr
/// - JSON lines instead when `CNCWIRE_LOG_FORMAT=json`
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Map session settings onto the runtime session configuration
pub fn session_config(settings: &cncwire_settings::SessionSettings) -> SessionConfig {
    SessionConfig {
        query_interval: Duration::from_millis(settings.query_interval_ms),
        reset_on_open: settings.reset_on_open,
    }
}

/// Transport parameters described by the connection settings
pub fn connection_params(settings: &cncwire_settings::ConnectionSettings) -> ConnectionParams {
    let mut params = match settings.connection_type {
        ConnectionType::Serial => ConnectionParams::serial(&settings.port, settings.baud_rate),
        ConnectionType::Socket => ConnectionParams::tcp(&settings.host, settings.tcp_port),
    };
    params.timeout_ms = settings.timeout_ms;
    params
}

/// Build a closed controller from a configuration
///
/// The transport is chosen by `connection.connection_type` and the line
/// parser by `connection.dialect`. Nothing is opened here.
pub fn build_controller(config: &Config) -> anyhow::Result<Controller> {
    config.validate()?;

    let dialect: Dialect = config.connection.dialect.parse()?;
    let params = connection_params(&config.connection);
    let transport: Box<dyn Transport> = match params.driver {
        ConnectionDriver::Serial => Box::new(SerialTransport::new(params)),
        ConnectionDriver::Tcp => Box::new(TcpTransport::new(params)),
    };

    tracing::debug!(
        dialect = %dialect,
        ident = %transport.ident(),
        "Building controller"
    );

    Ok(Controller::new(
        dialect,
        transport,
        session_config(&config.session),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_mapping() {
        let mut config = Config::new();
        config.session.query_interval_ms = 250;
        config.session.reset_on_open = false;

        let session = session_config(&config.session);
        assert_eq!(session.query_interval, Duration::from_millis(250));
        assert!(!session.reset_on_open);
    }

    #[test]
    fn test_connection_params_for_socket() {
        let mut config = Config::new();
        config.connection.connection_type = ConnectionType::Socket;
        config.connection.host = "192.168.1.20".to_string();
        config.connection.tcp_port = 23;
        config.connection.timeout_ms = 750;

        let params = connection_params(&config.connection);
        assert_eq!(params.driver, ConnectionDriver::Tcp);
        assert_eq!(params.port, "192.168.1.20");
        assert_eq!(params.network_port, 23);
        assert_eq!(params.timeout_ms, 750);
    }

    #[test]
    fn test_build_controller_uses_dialect_and_transport() {
        let mut config = Config::new();
        config.connection.connection_type = ConnectionType::Socket;
        config.connection.host = "localhost".to_string();
        config.connection.tcp_port = 9000;
        config.connection.dialect = "Cirqoid".to_string();

        let controller = build_controller(&config).unwrap();
        assert_eq!(controller.dialect(), Dialect::Cirqoid);

        let connection = controller.connection();
        assert_eq!(connection.connection_type, ConnectionType::Socket);
        assert_eq!(connection.ident, "localhost:9000");
        assert!(!connection.is_connected());
    }

    #[test]
    fn test_build_controller_serial_default() {
        let controller = build_controller(&Config::new()).unwrap();
        assert_eq!(controller.dialect(), Dialect::Grbl);
        assert_eq!(controller.connection().ident, "/dev/ttyUSB0");
    }

    #[test]
    fn test_build_controller_rejects_invalid_config() {
        let mut config = Config::new();
        config.connection.dialect = "tinyg".to_string();
        assert!(build_controller(&config).is_err());
    }
}
