use clap::Parser;
use cncwire::bridge::{BridgeConfig, SerialBridge};
use cncwire::{init_logging, Config, BUILD_DATE, VERSION};
use std::path::PathBuf;
use std::sync::OnceLock;

fn long_version() -> &'static str {
    static LONG_VERSION: OnceLock<String> = OnceLock::new();
    LONG_VERSION.get_or_init(|| format!("{} (built {})", VERSION, BUILD_DATE))
}

/// Expose a virtual serial device piped to a local TCP port
#[derive(Parser, Debug)]
#[command(name = "serial-bridge", version = long_version(), about)]
struct Args {
    /// Loopback TCP port to bridge to [default: 8888]
    tcp_port: Option<u16>,

    /// Path of the virtual serial device link [default: /tmp/ttyGRBL]
    serial_path: Option<PathBuf>,

    /// Read bridge settings from a JSON or TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<BridgeConfig> {
    let settings = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    Ok(BridgeConfig::from_settings(&settings.bridge)
        .with_overrides(args.tcp_port, args.serial_path.clone()))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            std::process::exit(cncwire::bridge::EXIT_FAILURE);
        }
    };

    tracing::info!(
        "serial-bridge {} bridging {} to tcp:127.0.0.1:{}",
        VERSION,
        config.serial_path.display(),
        config.tcp_port
    );

    let code = SerialBridge::new(config).run().await;
    std::process::exit(code);
}
