//! Error definitions for the panel protocol

use thiserror::Error;

/// Errors raised while decoding, dispatching or encoding panel frames
///
/// All of these are recoverable: the offending frame or command is dropped
/// and the stage that noticed it keeps running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame does not even contain a type byte
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Type byte is not part of the supported message family
    #[error("Unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// Frame length does not match the length implied by its type
    #[error("Unexpected frame size for type 0x{message_type:02X}: expected {expected}, got {actual}")]
    UnexpectedLength {
        message_type: u8,
        expected: usize,
        actual: usize,
    },

    /// Trailing checksum byte does not match the frame contents
    #[error("Checksum mismatch: provided 0x{provided:02X}, calculated 0x{calculated:02X}")]
    ChecksumMismatch { provided: u8, calculated: u8 },

    /// Inbound command payload is not one of `o`, `c`, `s`
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// Window selector outside of 1..=4 and ALL
    #[error("Invalid window selector: {0}")]
    InvalidWindow(u8),
}
