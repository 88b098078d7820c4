//! Resynchronising stream parser
//!
//! Bytes arrive from the socket in arbitrary chunks. The parser keeps them in
//! an append-only buffer and, after every append, extracts as many complete
//! and checksum-valid frames as the buffer holds:
//!
//! ```text
//!   ┌─► resync on 0xFF ──► need 3 bytes ──► resolve length from type byte
//!   │        │ none: clear      │ wait           │ unknown: drop 1 byte ─┐
//!   │        ▼                  ▼                ▼                       │
//!   │                                      need full frame ── wait       │
//!   │                                            │                       │
//!   │                            bad checksum: drop frame ───────────────┤
//!   └──────────────────── valid: emit frame, drop its bytes ◄────────────┘
//! ```
//!
//! Every wait point simply returns; the next [`FrameParser::push`] resumes from
//! the same buffered state, so the output does not depend on how the stream was
//! chunked.

use tracing::{debug, warn};

use super::frame::{hex_string, Frame, MessageType};
use super::{checksum, HEADER_LEN, SYNC_BYTE, TYPE_OFFSET};

/// Counters describing what the parser has seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub frames: u64,
    pub checksum_failures: u64,
    pub unknown_types: u64,
    pub discarded_bytes: u64,
}

#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    stats: ParserStats,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes and returns every frame that became complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        self.extract_frames()
    }

    /// Number of bytes currently waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Drops a partially received frame, returning how many bytes were discarded.
    ///
    /// Called by the reader when the line has been idle for longer than the
    /// frame timeout.
    pub fn discard_stale(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            debug!(
                "Discarding {} stale bytes: [{}]",
                dropped,
                hex_string(&self.buffer)
            );
            self.discard(dropped);
        }
        dropped
    }

    fn extract_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        loop {
            match self.buffer.iter().position(|&byte| byte == SYNC_BYTE) {
                Some(0) => {}
                Some(offset) => {
                    debug!("Synchronizing buffer, removing {} invalid bytes", offset);
                    self.discard(offset);
                }
                None => {
                    if !self.buffer.is_empty() {
                        debug!(
                            "No sync byte in {} buffered bytes, clearing buffer",
                            self.buffer.len()
                        );
                        let all = self.buffer.len();
                        self.discard(all);
                    }
                    break;
                }
            }

            if self.buffer.len() < HEADER_LEN {
                break;
            }

            let type_byte = self.buffer[TYPE_OFFSET];
            let Some(message_type) = MessageType::from_byte(type_byte) else {
                debug!("Unknown message type 0x{:02X}, dropping sync byte", type_byte);
                self.stats.unknown_types += 1;
                self.discard(1);
                continue;
            };

            let expected = message_type.frame_len();
            if self.buffer.len() < expected {
                debug!(
                    "Waiting for {} frame: have {} of {} bytes",
                    message_type,
                    self.buffer.len(),
                    expected
                );
                break;
            }

            let candidate: Vec<u8> = self.buffer.drain(..expected).collect();
            if let Some((provided, calculated)) = checksum::mismatch(&candidate) {
                warn!(
                    "Checksum mismatch on [{}]: provided 0x{:02X}, calculated 0x{:02X}, discarding",
                    hex_string(&candidate),
                    provided,
                    calculated
                );
                self.stats.checksum_failures += 1;
                self.stats.discarded_bytes += expected as u64;
                continue;
            }

            let frame = Frame::from_bytes(candidate);
            debug!("Valid {} frame received: {}", message_type, frame);
            self.stats.frames += 1;
            frames.push(frame);
        }

        frames
    }

    fn discard(&mut self, count: usize) {
        self.buffer.drain(..count);
        self.stats.discarded_bytes += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum;

    fn with_checksum(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.push(checksum::compute(body));
        frame
    }

    fn status_frame(windows: [u8; 4]) -> Vec<u8> {
        with_checksum(&[0xFF, 0x01, 0x5C, windows[0], windows[1], windows[2], windows[3]])
    }

    fn ack_frame() -> Vec<u8> {
        with_checksum(&[0xFF, 0x01, 0xB1, 0x00])
    }

    fn busy_frame() -> Vec<u8> {
        with_checksum(&[0xFF, 0x01, 0x27, 0x00])
    }

    fn feed_in_chunks(stream: &[u8], chunk: usize) -> Vec<Frame> {
        let mut parser = FrameParser::new();
        stream
            .chunks(chunk)
            .flat_map(|piece| parser.push(piece))
            .collect()
    }

    #[test]
    fn single_status_frame_empties_buffer() {
        let mut parser = FrameParser::new();
        let frames = parser.push(&status_frame([0x00, 0x00, 0x00, 0x00]));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 8);
        assert_eq!(frames[0].message_type(), Ok(MessageType::StatusWithoutPoll));
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn corrupted_checksum_emits_nothing_and_clears_candidate() {
        let mut stream = status_frame([0x00, 0x00, 0x00, 0x00]);
        let last = stream.len() - 1;
        stream[last] = stream[last].wrapping_add(1);

        let mut parser = FrameParser::new();
        assert!(parser.push(&stream).is_empty());
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.stats().checksum_failures, 1);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut stream = vec![0x00, 0x13, 0x37];
        stream.extend(ack_frame());

        let mut parser = FrameParser::new();
        let frames = parser.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type(), Ok(MessageType::Ack));
        assert_eq!(parser.stats().discarded_bytes, 3);
    }

    #[test]
    fn buffer_without_sync_byte_is_cleared() {
        let mut parser = FrameParser::new();
        assert!(parser.push(&[0x01, 0x02, 0x03, 0x04]).is_empty());
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn unknown_type_drops_only_sync_byte() {
        // An echoed command (type byte is a window selector) followed by a real frame
        let mut stream = with_checksum(&[0xFF, 0x01, 0x05, 0x5C]);
        stream.extend(busy_frame());

        let mut parser = FrameParser::new();
        let frames = parser.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_type(), Ok(MessageType::Busy));
        assert_eq!(parser.buffered(), 0);
        assert!(parser.stats().unknown_types >= 1);
    }

    #[test]
    fn selector_in_type_position_yields_nothing() {
        // Eight bytes shaped like a status frame, but with window selector 0x05 at offset 2
        let stream = with_checksum(&[0xFF, 0x01, 0x05, 0x5C, 0x00, 0x00, 0x00]);
        assert_eq!(stream.len(), 8);

        let mut parser = FrameParser::new();
        assert!(parser.push(&stream).is_empty());
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.stats().unknown_types, 1);
        assert_eq!(parser.stats().frames, 0);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let stream = status_frame([0x01, 0x00, 0x00, 0x00]);
        let mut parser = FrameParser::new();

        assert!(parser.push(&stream[..2]).is_empty());
        assert_eq!(parser.buffered(), 2);
        assert!(parser.push(&stream[2..6]).is_empty());
        assert_eq!(parser.buffered(), 6);

        let frames = parser.push(&stream[6..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), stream.as_slice());
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut stream = status_frame([0x01, 0x02, 0x04, 0x08]);
        stream.extend(ack_frame());
        stream.extend(busy_frame());

        let frames = FrameParser::new().push(&stream);
        let types: Vec<_> = frames.iter().map(|f| f.message_type().ok()).collect();
        assert_eq!(
            types,
            vec![
                Some(MessageType::StatusWithoutPoll),
                Some(MessageType::Ack),
                Some(MessageType::Busy)
            ]
        );
    }

    #[test]
    fn chunking_does_not_change_output() {
        let mut stream = vec![0x12, 0xFF];
        stream.extend(status_frame([0x3F, 0x00, 0x01, 0x20]));
        stream.extend([0xFF, 0x01, 0x99]);
        stream.extend(ack_frame());
        let mut corrupt = status_frame([0x01, 0x01, 0x01, 0x01]);
        corrupt[7] ^= 0x55;
        stream.extend(corrupt);
        stream.extend(with_checksum(&[0xFF, 0x02, 0x5A, 0x00, 0x00, 0x00, 0x04]));
        stream.extend([0x00, 0xFF]);
        stream.extend(busy_frame());

        let reference = feed_in_chunks(&stream, stream.len());
        assert_eq!(reference.len(), 4);

        for chunk in 1..stream.len() {
            assert_eq!(
                feed_in_chunks(&stream, chunk),
                reference,
                "chunk size {} produced different frames",
                chunk
            );
        }
    }

    #[test]
    fn discard_stale_drops_partial_frame() {
        let stream = status_frame([0x00, 0x00, 0x00, 0x00]);
        let mut parser = FrameParser::new();
        parser.push(&stream[..5]);

        assert_eq!(parser.discard_stale(), 5);
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.discard_stale(), 0);

        assert_eq!(parser.push(&stream).len(), 1);
    }
}
