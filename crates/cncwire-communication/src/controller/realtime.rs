//! Realtime command bytes
//!
//! Realtime commands bypass the firmware's input buffer and are written
//! without a line terminator.

use serde::{Deserialize, Serialize};

/// Single-byte realtime command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealtimeCommand {
    /// Soft reset (Ctrl-X)
    SoftReset,
    /// Status report query
    StatusQuery,
    /// Feed hold
    FeedHold,
    /// Cycle start / resume
    CycleStart,
    /// Safety door
    SafetyDoor,
    /// Cancel the active jog
    JogCancel,
    /// Reset feed override to 100%
    FeedOverrideReset,
}

impl RealtimeCommand {
    /// Byte written on the wire
    pub fn as_byte(&self) -> u8 {
        match self {
            RealtimeCommand::SoftReset => 0x18,
            RealtimeCommand::StatusQuery => b'?',
            RealtimeCommand::FeedHold => b'!',
            RealtimeCommand::CycleStart => b'~',
            RealtimeCommand::SafetyDoor => 0x84,
            RealtimeCommand::JogCancel => 0x85,
            RealtimeCommand::FeedOverrideReset => 0x90,
        }
    }
}

impl From<RealtimeCommand> for u8 {
    fn from(command: RealtimeCommand) -> Self {
        command.as_byte()
    }
}
