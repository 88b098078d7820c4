//! Periodic STATUS poll requests

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{CommandEncoder, Frame};

/// Queues a status poll for all windows every `interval`, starting immediately.
pub async fn run_poller(
    outgoing: mpsc::Sender<Frame>,
    encoder: CommandEncoder,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Poller stage started, interval {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Requesting window status");
                if outgoing.send(encoder.status_poll()).await.is_err() {
                    warn!("Outgoing queue closed, stopping poller");
                    break;
                }
            }
        }
    }

    info!("Poller stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn polls_on_every_interval() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poller(
            tx,
            CommandEncoder::default(),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        for _ in 0..3 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.as_bytes(), &[0xFF, 0x01, 0x05, 0x5C, 0x62]);
        }

        cancel.cancel();
        task.await.unwrap();
    }
}
