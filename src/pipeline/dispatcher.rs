//! Message dispatch for validated frames
//!
//! STATUS frames update every window and request a publish pass. ACK and BUSY
//! frames are informational and only logged.

use tracing::{debug, info};

use crate::protocol::{
    Frame, MessageType, ProtocolError, HEADER_LEN, STATUS_FRAME_LEN, STATUS_PAYLOAD_OFFSET,
    STATUS_WINDOW_COUNT,
};
use crate::window::SharedWindow;

/// What a dispatched frame turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Windows were updated; publish with `force_publish` for the first status since startup
    Status { changed: usize, force_publish: bool },
    Ack,
    Busy,
}

pub struct MessageDispatcher {
    windows: Vec<SharedWindow>,
    status_seen: bool,
}

impl MessageDispatcher {
    pub fn new(windows: Vec<SharedWindow>) -> Self {
        Self {
            windows,
            status_seen: false,
        }
    }

    pub async fn dispatch(&mut self, frame: &Frame) -> Result<Dispatched, ProtocolError> {
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort(frame.len()));
        }

        match frame.message_type()? {
            message_type @ (MessageType::StatusWithoutPoll | MessageType::StatusWithPoll) => {
                debug!("Detected {} message", message_type);
                self.apply_status(frame, message_type).await
            }
            MessageType::Ack => {
                debug!("Detected ACK message");
                Ok(Dispatched::Ack)
            }
            MessageType::Busy => {
                debug!("Detected BUSY message");
                Ok(Dispatched::Busy)
            }
        }
    }

    async fn apply_status(
        &mut self,
        frame: &Frame,
        message_type: MessageType,
    ) -> Result<Dispatched, ProtocolError> {
        if frame.len() != STATUS_FRAME_LEN {
            return Err(ProtocolError::UnexpectedLength {
                message_type: message_type.as_byte(),
                expected: STATUS_FRAME_LEN,
                actual: frame.len(),
            });
        }

        let payload =
            &frame.as_bytes()[STATUS_PAYLOAD_OFFSET..STATUS_PAYLOAD_OFFSET + STATUS_WINDOW_COUNT];

        let mut changed = 0;
        for window in &self.windows {
            let mut window = window.lock().await;
            let Some(&status) = usize::from(window.number())
                .checked_sub(1)
                .and_then(|index| payload.get(index))
            else {
                continue;
            };
            changed += window.set_status(status);
        }

        let force_publish = !self.status_seen;
        if force_publish {
            info!("First status received, forcing a full publish");
        }
        self.status_seen = true;

        Ok(Dispatched::Status {
            changed,
            force_publish,
        })
    }
}
