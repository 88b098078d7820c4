//! Dirty-flag driven publish pass

use rumqttc::{AsyncClient, QoS};
use tracing::{debug, warn};

use super::{BridgeError, MessageSink, StateMessage, WindowPublisher};
use crate::window::SharedWindow;

/// Outcome of one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Windows whose flags were cleared after publishing
    pub windows: usize,
    /// Individual messages handed to the sink
    pub messages: usize,
}

/// Publishes window state through any [`MessageSink`]
///
/// Each window is locked for the whole of its pass, so the dirty flags read
/// and cleared here cannot interleave with a concurrent status update. A
/// window's flags are only cleared if every one of its messages was accepted.
#[derive(Debug, Clone)]
pub struct StatePublisher<S> {
    windows: Vec<SharedWindow>,
    sink: S,
}

impl<S> StatePublisher<S> {
    pub fn new(windows: Vec<SharedWindow>, sink: S) -> Self {
        Self { windows, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S> WindowPublisher for StatePublisher<S>
where
    S: MessageSink + Send + Sync,
{
    async fn publish_windows(&self, force: bool) -> Result<PublishSummary, BridgeError> {
        let mut summary = PublishSummary::default();
        let mut first_error = None;

        for window in &self.windows {
            let mut window = window.lock().await;
            let messages = StateMessage::for_window(&window, force);
            if messages.is_empty() {
                continue;
            }

            let mut complete = true;
            for message in messages {
                debug!("Publishing {}", message);
                match self.sink.send(message).await {
                    Ok(()) => summary.messages += 1,
                    Err(e) => {
                        warn!("Failed to publish state of {}: {}", window.name(), e);
                        first_error.get_or_insert(e);
                        complete = false;
                        break;
                    }
                }
            }

            if complete {
                window.clear_dirty();
                summary.windows += 1;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Never waits for room in the request queue. While the broker is away the
/// queue fills up; the publish then fails and the window stays dirty until
/// the next pass.
impl MessageSink for AsyncClient {
    async fn send(&self, message: StateMessage) -> Result<(), BridgeError> {
        self.try_publish(message.topic, QoS::AtLeastOnce, message.retain, message.payload)?;
        Ok(())
    }
}
