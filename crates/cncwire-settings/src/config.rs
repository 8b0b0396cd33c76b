//! Configuration for cncwire
//!
//! Supports JSON and TOML files; the format follows the file extension.
//!
//! Configuration is organized into sections:
//! - Connection settings (transport, port, dialect)
//! - Session settings (status polling, reset on open)
//! - Serial bridge settings (TCP port, device link, bridging tool)

use crate::error::{SettingsError, SettingsResult};
use cncwire_core::ConnectionType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DIALECTS: &[&str] = &["grbl", "cirqoid"];

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Transport family
    pub connection_type: ConnectionType,
    /// Serial device path
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Hostname for socket connections
    pub host: String,
    /// TCP port for socket connections
    pub tcp_port: u16,
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
    /// Firmware dialect (`grbl` or `cirqoid`)
    pub dialect: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            host: "localhost".to_string(),
            tcp_port: 8888,
            timeout_ms: 5000,
            dialect: "grbl".to_string(),
        }
    }
}

/// Controller session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Status query interval in milliseconds
    pub query_interval_ms: u64,
    /// Send a soft reset right after opening
    pub reset_on_open: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            query_interval_ms: 100,
            reset_on_open: true,
        }
    }
}

/// Serial bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Loopback TCP port the virtual device is piped to
    pub tcp_port: u16,
    /// Path of the virtual serial device link
    pub serial_path: PathBuf,
    /// Bridging tool executable
    pub tool: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            tcp_port: 8888,
            serial_path: PathBuf::from("/tmp/ttyGRBL"),
            tool: "socat".to_string(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Session settings
    pub session: SessionSettings,
    /// Serial bridge settings
    pub bridge: BridgeSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`<config dir>/cncwire/config.toml`)
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("cncwire").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load config from a `.json` or `.toml` file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config from a file, or fall back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to a `.json` or `.toml` file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }
        match connection.connection_type {
            ConnectionType::Serial if connection.port.trim().is_empty() => {
                return Err(SettingsError::invalid("connection.port", "must not be empty"));
            }
            ConnectionType::Socket if connection.host.trim().is_empty() => {
                return Err(SettingsError::invalid("connection.host", "must not be empty"));
            }
            _ => {}
        }
        if !DIALECTS.contains(&connection.dialect.to_ascii_lowercase().as_str()) {
            return Err(SettingsError::invalid(
                "connection.dialect",
                format!("expected one of {}", DIALECTS.join(", ")),
            ));
        }

        if self.session.query_interval_ms == 0 {
            return Err(SettingsError::invalid("session.query_interval_ms", "must be > 0"));
        }

        if self.bridge.serial_path.as_os_str().is_empty() {
            return Err(SettingsError::invalid("bridge.serial_path", "must not be empty"));
        }
        if self.bridge.tool.trim().is_empty() {
            return Err(SettingsError::invalid("bridge.tool", "must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.query_interval_ms, 100);
        assert_eq!(config.bridge.tcp_port, 8888);
        assert_eq!(config.bridge.serial_path, PathBuf::from("/tmp/ttyGRBL"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::new();
        config.connection.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.connection.dialect = "tinyg".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connection.dialect"));

        let mut config = Config::new();
        config.connection.connection_type = ConnectionType::Socket;
        config.connection.host = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.session.query_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[connection]\nport = \"/dev/ttyACM0\"\n").unwrap();
        assert_eq!(config.connection.port, "/dev/ttyACM0");
        assert_eq!(config.connection.baud_rate, 115200);
        assert_eq!(config.bridge, BridgeSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            format_of(Path::new("config.yaml")),
            Err(SettingsError::UnsupportedFormat(_))
        ));
        assert!(format_of(Path::new("config")).is_err());
    }
}
