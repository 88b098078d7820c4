//! Outbound command frames
//!
//! Commands are always five bytes: `[src, dst, window, command, checksum]`.
//! The controller's source address doubles as the sync byte.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::frame::Frame;
use super::{
    checksum, ProtocolError, CMD_CLOSE, CMD_OPEN, CMD_STATUS_WITHOUT_POLL, CMD_STOP, DST_PANEL,
    MAX_WINDOW, SRC_CONTROLLER, WINDOW_ALL,
};

/// Movement requested for a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowAction {
    Open,
    Close,
    Stop,
}

impl WindowAction {
    /// Maps the single-character command used on the MQTT command topic
    pub fn from_char(c: char) -> Result<Self, ProtocolError> {
        match c {
            'o' => Ok(Self::Open),
            'c' => Ok(Self::Close),
            's' => Ok(Self::Stop),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn command_byte(self) -> u8 {
        match self {
            Self::Open => CMD_OPEN,
            Self::Close => CMD_CLOSE,
            Self::Stop => CMD_STOP,
        }
    }
}

impl FromStr for WindowAction {
    type Err = ProtocolError;

    /// Accepts exactly one command character, ignoring surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(ProtocolError::UnknownCommand(trimmed.to_string())),
        }
    }
}

impl fmt::Display for WindowAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Which window a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSelector {
    Window(u8),
    All,
}

impl WindowSelector {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Window(number) => number,
            Self::All => WINDOW_ALL,
        }
    }
}

impl TryFrom<u8> for WindowSelector {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1..=MAX_WINDOW => Ok(Self::Window(value)),
            WINDOW_ALL => Ok(Self::All),
            other => Err(ProtocolError::InvalidWindow(other)),
        }
    }
}

impl fmt::Display for WindowSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Window(number) => write!(f, "window {}", number),
            Self::All => f.write_str("all windows"),
        }
    }
}

/// Logical command before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move {
        window: WindowSelector,
        action: WindowAction,
    },
    /// Ask the panel for the status of every window
    StatusPoll,
}

impl Command {
    fn window(&self) -> WindowSelector {
        match self {
            Self::Move { window, .. } => *window,
            Self::StatusPoll => WindowSelector::All,
        }
    }

    fn command_byte(&self) -> u8 {
        match self {
            Self::Move { action, .. } => action.command_byte(),
            Self::StatusPoll => CMD_STATUS_WITHOUT_POLL,
        }
    }
}

/// Builds checksummed command frames for one controller/panel pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEncoder {
    controller: u8,
    panel: u8,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(SRC_CONTROLLER, DST_PANEL)
    }
}

impl CommandEncoder {
    pub fn new(controller: u8, panel: u8) -> Self {
        Self { controller, panel }
    }

    pub fn encode(&self, command: Command) -> Frame {
        let mut bytes = vec![
            self.controller,
            self.panel,
            command.window().as_byte(),
            command.command_byte(),
        ];
        bytes.push(checksum::compute(&bytes));

        let frame = Frame::from_bytes(bytes);
        debug!("Encoded {:?} as {}", command, frame);
        frame
    }

    /// Encodes a movement command from the raw window number and command character.
    pub fn window_action(&self, window: u8, action: char) -> Result<Frame, ProtocolError> {
        let window = WindowSelector::try_from(window)?;
        let action = WindowAction::from_char(action)?;
        Ok(self.encode(Command::Move { window, action }))
    }

    pub fn status_poll(&self) -> Frame {
        self.encode(Command::StatusPoll)
    }
}
