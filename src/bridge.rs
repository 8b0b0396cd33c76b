//! Serial bridge supervisor
//!
//! Exposes a virtual serial device that is piped to a local TCP port by an
//! external bridging tool (socat). The supervisor checks the tool is
//! installed, runs it as a child process and tears it down again on
//! SIGINT/SIGTERM, removing the device link the tool leaves behind.

use cncwire_settings::BridgeSettings;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;

/// Exit code when the bridge could not be started
pub const EXIT_FAILURE: i32 = 1;

/// Serial bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Loopback TCP port the device is piped to
    pub tcp_port: u16,
    /// Path of the virtual serial device link
    pub serial_path: PathBuf,
    /// Bridging tool executable
    pub tool: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

impl BridgeConfig {
    /// Build from the `bridge` section of a configuration file
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            tcp_port: settings.tcp_port,
            serial_path: settings.serial_path.clone(),
            tool: settings.tool.clone(),
        }
    }

    /// Apply command line values over the configured ones
    pub fn with_overrides(mut self, tcp_port: Option<u16>, serial_path: Option<PathBuf>) -> Self {
        if let Some(port) = tcp_port {
            self.tcp_port = port;
        }
        if let Some(path) = serial_path {
            self.serial_path = path;
        }
        self
    }

    /// Arguments passed to the bridging tool
    pub fn tool_args(&self) -> Vec<String> {
        vec![
            "-d".to_string(),
            "-d".to_string(),
            format!("pty,raw,echo=0,link={}", self.serial_path.display()),
            format!("tcp:127.0.0.1:{}", self.tcp_port),
        ]
    }

    /// Package manager command that installs the bridging tool
    pub fn install_hint(&self) -> String {
        if cfg!(target_os = "macos") {
            format!("brew install {}", self.tool)
        } else {
            format!("sudo apt-get install {}", self.tool)
        }
    }
}

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Created, nothing checked yet
    Starting,
    /// The bridging tool is not installed
    MissingDependency,
    /// Spawning the bridging tool
    Bridging,
    /// The bridging tool is running
    Active,
    /// Finished with the given exit code
    Terminated(i32),
}

/// Shutdown request received by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    /// Conventional `128 + signo` exit code
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

/// Serial bridge errors
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The bridging tool is not on the PATH
    #[error("'{tool}' was not found in PATH. Install it with: {hint}")]
    MissingTool {
        /// Tool name
        tool: String,
        /// Install command for this platform
        hint: String,
    },

    /// The bridging tool could not be started
    #[error("Failed to start '{tool}': {source}")]
    Spawn {
        /// Tool name
        tool: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Waiting on the child process failed
    #[error("Failed to wait for bridge process: {0}")]
    Wait(#[source] io::Error),

    /// Installing the signal handlers failed
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

impl BridgeError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

enum Outcome {
    Exited(io::Result<ExitStatus>),
    Signalled(io::Result<ShutdownSignal>),
}

/// Supervises one bridging tool process
#[derive(Debug)]
pub struct SerialBridge {
    config: BridgeConfig,
    state: BridgeState,
}

impl SerialBridge {
    /// Create a supervisor in the `Starting` state
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: BridgeState::Starting,
        }
    }

    /// Current state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn transition(&mut self, next: BridgeState) {
        tracing::info!(from = ?self.state, to = ?next, "Serial bridge state change");
        self.state = next;
    }

    /// Resolve the bridging tool on the PATH
    pub fn locate_tool(&mut self) -> Result<PathBuf, BridgeError> {
        match which::which(&self.config.tool) {
            Ok(path) => {
                tracing::debug!("Found {} at {}", self.config.tool, path.display());
                Ok(path)
            }
            Err(e) => {
                tracing::debug!("Lookup of {} failed: {}", self.config.tool, e);
                self.transition(BridgeState::MissingDependency);
                Err(BridgeError::MissingTool {
                    tool: self.config.tool.clone(),
                    hint: self.config.install_hint(),
                })
            }
        }
    }

    /// Run the bridge until the tool exits or a shutdown signal arrives
    ///
    /// Returns the process exit code: the tool's own exit code, 1 if it
    /// could not be started or died from a signal, 130/143 on SIGINT/SIGTERM.
    pub async fn run(&mut self) -> i32 {
        match self.start().await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("{}", e);
                e.exit_code()
            }
        }
    }

    async fn start(&mut self) -> Result<i32, BridgeError> {
        let program = self.locate_tool()?;
        let args = self.config.tool_args();
        self.supervise(&program, &args, shutdown_signal()).await
    }

    /// Spawn `program` and wait for it to exit or for `shutdown` to resolve
    pub async fn supervise<F>(
        &mut self,
        program: &Path,
        args: &[String],
        shutdown: F,
    ) -> Result<i32, BridgeError>
    where
        F: Future<Output = io::Result<ShutdownSignal>>,
    {
        self.transition(BridgeState::Bridging);

        let mut child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                tool: self.config.tool.clone(),
                source,
            })?;

        self.transition(BridgeState::Active);
        tracing::info!(
            port = %self.config.serial_path.display(),
            tcp_port = self.config.tcp_port,
            pid = ?child.id(),
            "Serial bridge active"
        );

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            signal = shutdown => Outcome::Signalled(signal),
        };

        let code = match outcome {
            Outcome::Exited(status) => {
                let status = status.map_err(BridgeError::Wait)?;
                let code = status.code().unwrap_or(EXIT_FAILURE);
                if status.success() {
                    tracing::info!("{} exited", self.config.tool);
                } else {
                    tracing::warn!("{} exited with {}", self.config.tool, status);
                }
                code
            }
            Outcome::Signalled(signal) => {
                let signal = signal.map_err(BridgeError::Signal)?;
                tracing::info!("Received {:?}, stopping {}", signal, self.config.tool);
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to stop {}: {}", self.config.tool, e);
                }
                remove_link(&self.config.serial_path);
                signal.exit_code()
            }
        };

        self.transition(BridgeState::Terminated(code));
        Ok(code)
    }
}

/// Remove the device link if the tool left it behind
fn remove_link(path: &Path) {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            } else {
                tracing::debug!("Removed {}", path.display());
            }
        }
        Ok(_) => tracing::warn!("{} is not a link, leaving it in place", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to inspect {}: {}", path.display(), e),
    }
}

/// Wait for SIGINT or SIGTERM
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| ShutdownSignal::Interrupt),
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}
