//! # Panel Wire Protocol
//!
//! Byte-level protocol spoken by the multi-window motor controller panel.
//! Every message is a short, fixed-length frame that starts with a sync byte
//! and ends with a single additive checksum byte:
//!
//! ```text
//! offset  0      1      2      3 ..        len-1
//!        [0xFF] [src]  [type] [payload..] [checksum]
//! ```
//!
//! The frame length is implied by the type byte alone, so the receiving side
//! can resynchronise on any byte stream without a length field.
//!
//! ## Module Layout
//!
//! ```text
//! protocol/
//! ├── checksum.rs  - additive checksum (sync byte excluded)
//! ├── command.rs   - outbound command frames (open/close/stop/poll)
//! ├── error.rs     - protocol error taxonomy
//! ├── frame.rs     - validated frame and message type table
//! └── parser.rs    - resynchronising stream parser
//! ```

pub mod checksum;
pub mod command;
pub mod error;
pub mod frame;
pub mod parser;

pub use command::{Command, CommandEncoder, WindowAction, WindowSelector};
pub use error::ProtocolError;
pub use frame::{Frame, MessageType};
pub use parser::FrameParser;

/// Leading byte of every frame
pub const SYNC_BYTE: u8 = 0xFF;

/// Source address used by this controller
pub const SRC_CONTROLLER: u8 = 0xFF;

/// Destination address of the first (and usually only) panel
pub const DST_PANEL: u8 = 0x01;

/// Window selector addressing every window at once
pub const WINDOW_ALL: u8 = 0x05;

/// Highest addressable single window
pub const MAX_WINDOW: u8 = 0x04;

pub const CMD_OPEN: u8 = 0x55;
pub const CMD_CLOSE: u8 = 0xAA;
pub const CMD_STOP: u8 = 0xA5;
pub const CMD_STATUS_WITH_POLL: u8 = 0x5A;
pub const CMD_STATUS_WITHOUT_POLL: u8 = 0x5C;

pub const CONTROLLER_ACK: u8 = 0xB1;
pub const CONTROLLER_BUSY: u8 = 0x27;

/// Bytes needed before the type byte can be inspected
pub const HEADER_LEN: usize = 3;

/// Position of the type byte inside a received frame
pub const TYPE_OFFSET: usize = 2;

/// Total length of a STATUS frame (sync, src, type, 4 window bytes, checksum)
pub const STATUS_FRAME_LEN: usize = 8;

/// Total length of an ACK or BUSY frame
pub const CONTROL_FRAME_LEN: usize = 5;

/// Offset of the first per-window status byte in a STATUS frame
pub const STATUS_PAYLOAD_OFFSET: usize = 3;

/// Number of windows reported by a single STATUS frame
pub const STATUS_WINDOW_COUNT: usize = 4;
