//! Controller sessions
//!
//! - [`ControllerSession`]: protocol-agnostic connection state machine
//! - [`Controller`]: a session bound to a firmware dialect and a command queue
//! - [`RealtimeCommand`]: the out-of-band command bytes

mod adapter;
mod realtime;
mod session;

pub use adapter::Controller;
pub use realtime::RealtimeCommand;
pub use session::{ControllerSession, SessionConfig, WeakSession};
