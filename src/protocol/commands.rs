use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::Serialize;

use super::ProtocolError;

pub const FRAME_SIZE: usize = 8;
pub const FRAME_START: u8 = 0x9B;
pub const FRAME_LENGTH: u8 = 0x06;
pub const FRAME_END: u8 = 0x9D;

/// Control commands understood by the desk, a closed set.
///
/// Each command maps to one immutable 8-byte frame
/// `[start, length, type, payload_lo, payload_hi, checksum_lo, checksum_hi, end]`.
/// The checksum bytes are carried as captured from the device family; the
/// algorithm behind them is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Command {
    /// Activates the control-box display. The box only broadcasts height
    /// telemetry while the display is active, so this is a protocol
    /// precondition, not a nicety.
    WakeUp,
    Up,
    Down,
    Preset1,
    Preset2,
    Sitting,
    Standing,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::WakeUp,
        Command::Up,
        Command::Down,
        Command::Preset1,
        Command::Preset2,
        Command::Sitting,
        Command::Standing,
    ];

    /// The precomputed wire frame for this command.
    pub const fn frame(self) -> [u8; FRAME_SIZE] {
        match self {
            Command::WakeUp => [0x9B, 0x06, 0x02, 0x00, 0x00, 0x6C, 0xA1, 0x9D],
            Command::Up => [0x9B, 0x06, 0x02, 0x01, 0x00, 0xFC, 0xA0, 0x9D],
            Command::Down => [0x9B, 0x06, 0x02, 0x02, 0x00, 0x0C, 0xA0, 0x9D],
            Command::Preset1 => [0x9B, 0x06, 0x02, 0x04, 0x00, 0xAC, 0xA3, 0x9D],
            Command::Preset2 => [0x9B, 0x06, 0x02, 0x08, 0x00, 0xAC, 0xA6, 0x9D],
            Command::Sitting => [0x9B, 0x06, 0x02, 0x00, 0x01, 0xAC, 0x60, 0x9D],
            Command::Standing => [0x9B, 0x06, 0x02, 0x10, 0x00, 0xAC, 0xAC, 0x9D],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::WakeUp => "WAKE_UP",
            Command::Up => "UP",
            Command::Down => "DOWN",
            Command::Preset1 => "PRESET1",
            Command::Preset2 => "PRESET2",
            Command::Sitting => "SITTING",
            Command::Standing => "STANDING",
        }
    }

    /// Whether this command moves the desk to a stored target position.
    pub const fn is_preset(self) -> bool {
        matches!(
            self,
            Command::Preset1 | Command::Preset2 | Command::Sitting | Command::Standing
        )
    }

    /// Resolve a wire name ("UP", "PRESET1", ...) against the static table.
    pub fn from_name(name: &str) -> Result<Command, ProtocolError> {
        COMMAND_NAMES
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownCommand(name.to_string()))
    }
}

static COMMAND_NAMES: Lazy<HashMap<&'static str, Command>> = Lazy::new(|| {
    Command::ALL.iter().map(|&c| (c.name(), c)).collect()
});

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::from_name(s)
    }
}
