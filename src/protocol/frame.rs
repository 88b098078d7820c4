//! Validated frames and the message type table

use std::fmt;

use super::{
    ProtocolError, CMD_STATUS_WITHOUT_POLL, CMD_STATUS_WITH_POLL, CONTROLLER_ACK,
    CONTROLLER_BUSY, CONTROL_FRAME_LEN, STATUS_FRAME_LEN, TYPE_OFFSET,
};

/// Message types the panel can send
///
/// The type byte determines the total frame length; anything outside this
/// table cannot start a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Status report for all four windows (reply to a plain status request)
    StatusWithoutPoll,
    /// Status report for all four windows (reply to a polling status request)
    StatusWithPoll,
    /// Panel acknowledged the last command
    Ack,
    /// Panel is busy and ignored the last command
    Busy,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_STATUS_WITHOUT_POLL => Some(Self::StatusWithoutPoll),
            CMD_STATUS_WITH_POLL => Some(Self::StatusWithPoll),
            CONTROLLER_ACK => Some(Self::Ack),
            CONTROLLER_BUSY => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::StatusWithoutPoll => CMD_STATUS_WITHOUT_POLL,
            Self::StatusWithPoll => CMD_STATUS_WITH_POLL,
            Self::Ack => CONTROLLER_ACK,
            Self::Busy => CONTROLLER_BUSY,
        }
    }

    /// Total frame length including sync and checksum bytes
    pub fn frame_len(self) -> usize {
        match self {
            Self::StatusWithoutPoll | Self::StatusWithPoll => STATUS_FRAME_LEN,
            Self::Ack | Self::Busy => CONTROL_FRAME_LEN,
        }
    }

    pub fn is_status(self) -> bool {
        matches!(self, Self::StatusWithoutPoll | Self::StatusWithPoll)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::StatusWithoutPoll => "STATUS",
            Self::StatusWithPoll => "STATUS_POLL",
            Self::Ack => "ACK",
            Self::Busy => "BUSY",
        };
        write!(f, "{} (0x{:02X})", name, self.as_byte())
    }
}

/// One complete protocol message
///
/// Frames coming out of [`FrameParser`](super::FrameParser) have already passed
/// checksum validation. Frames built by [`CommandEncoder`](super::CommandEncoder)
/// carry a freshly computed checksum. An empty frame is used as a wake-up
/// marker on the outgoing queue and is never written to the socket.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Marker frame that unblocks a waiting writer without sending anything
    pub fn wake_up() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw type byte, if the frame is long enough to carry one
    pub fn type_byte(&self) -> Option<u8> {
        self.bytes.get(TYPE_OFFSET).copied()
    }

    /// Resolves the message type, rejecting short frames and unknown types
    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        let byte = self
            .type_byte()
            .ok_or(ProtocolError::FrameTooShort(self.bytes.len()))?;
        MessageType::from_byte(byte).ok_or(ProtocolError::UnknownMessageType(byte))
    }

    pub fn checksum(&self) -> Option<u8> {
        self.bytes.last().copied()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", hex_string(&self.bytes))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Frame{}", self)
    }
}

/// Formats bytes as comma separated upper-case hex pairs
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_matches_frame_lengths() {
        assert_eq!(MessageType::from_byte(0x5C).map(MessageType::frame_len), Some(8));
        assert_eq!(MessageType::from_byte(0x5A).map(MessageType::frame_len), Some(8));
        assert_eq!(MessageType::from_byte(0xB1).map(MessageType::frame_len), Some(5));
        assert_eq!(MessageType::from_byte(0x27).map(MessageType::frame_len), Some(5));
        assert_eq!(MessageType::from_byte(0x55), None);
        assert_eq!(MessageType::from_byte(0x05), None);
    }

    #[test]
    fn message_type_reports_short_and_unknown_frames() {
        let short = Frame::from_bytes(vec![0xFF, 0x01]);
        assert_eq!(short.message_type(), Err(ProtocolError::FrameTooShort(2)));

        let unknown = Frame::from_bytes(vec![0xFF, 0x01, 0x42, 0x43]);
        assert_eq!(
            unknown.message_type(),
            Err(ProtocolError::UnknownMessageType(0x42))
        );

        let ack = Frame::from_bytes(vec![0xFF, 0x01, 0xB1, 0x00, 0xB2]);
        assert_eq!(ack.message_type(), Ok(MessageType::Ack));
    }

    #[test]
    fn renders_as_hex() {
        let frame = Frame::from_bytes(vec![0xFF, 0x01, 0x05, 0x5C, 0x62]);
        assert_eq!(frame.to_string(), "[FF, 01, 05, 5C, 62]");
        assert_eq!(format!("{:?}", Frame::wake_up()), "Frame[]");
    }
}
