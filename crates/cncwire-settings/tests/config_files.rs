//! Config file persistence tests

use cncwire_core::ConnectionType;
use cncwire_settings::{Config, SettingsError};
use std::path::PathBuf;

#[test]
fn test_toml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::new();
    config.connection.connection_type = ConnectionType::Socket;
    config.connection.host = "192.168.1.50".to_string();
    config.connection.tcp_port = 23;
    config.connection.dialect = "cirqoid".to_string();
    config.bridge.serial_path = PathBuf::from("/tmp/ttyCNC");

    config.save_to_file(&path).unwrap();
    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "connection": { "connection_type": "socket", "host": "cnc.local" }, "session": { "query_interval_ms": 250 } }"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.connection.connection_type, ConnectionType::Socket);
    assert_eq!(config.connection.host, "cnc.local");
    assert_eq!(config.session.query_interval_ms, 250);
    assert!(config.session.reset_on_open);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[session]\nquery_interval_ms = 0\n").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    std::fs::write(&path, "not = [valid").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::IoError(_))
    ));
    assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
}

#[test]
fn test_save_rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    assert!(matches!(
        Config::new().save_to_file(&path),
        Err(SettingsError::UnsupportedFormat(_))
    ));
    assert!(!path.exists());
}
