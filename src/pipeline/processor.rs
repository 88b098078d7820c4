//! Processor stage: incoming queue → window state → MQTT publisher

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatched, MessageDispatcher};
use crate::mqtt::WindowPublisher;
use crate::protocol::Frame;

/// Applies every incoming frame and publishes the resulting state.
///
/// Bad frames and failed publishes are logged and skipped; only the stop flag
/// or a closed queue ends the stage.
pub async fn run_processor<P>(
    mut incoming: mpsc::Receiver<Frame>,
    mut dispatcher: MessageDispatcher,
    publisher: P,
    cancel: CancellationToken,
) where
    P: WindowPublisher,
{
    info!("Processor stage started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = incoming.recv() => match frame {
                Some(frame) => frame,
                None => {
                    debug!("Incoming queue closed");
                    break;
                }
            },
        };

        match dispatcher.dispatch(&frame).await {
            Ok(Dispatched::Status {
                changed,
                force_publish,
            }) => {
                debug!("Status applied, {} fields changed", changed);
                match publisher.publish_windows(force_publish).await {
                    Ok(summary) if summary.messages > 0 => {
                        info!(
                            "Published {} messages for {} windows",
                            summary.messages, summary.windows
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Publishing window state failed: {}", e),
                }
            }
            Ok(Dispatched::Ack) => debug!("Controller acknowledged command"),
            Ok(Dispatched::Busy) => info!("Controller busy"),
            Err(e) => warn!("Dropping frame {}: {}", frame, e),
        }
    }

    info!("Processor stage stopped");
}
