//! Writer stage: outgoing queue → socket

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::PipelineError;
use crate::protocol::Frame;

/// Drains the outgoing queue onto the panel socket.
///
/// The dequeue is bounded by `idle_timeout` so the stop flag is observed even
/// when nothing is queued. Empty frames only wake the stage up and are never
/// written.
pub async fn run_writer<W>(
    mut writer: W,
    mut outgoing: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    idle_timeout: Duration,
) -> Result<(), PipelineError>
where
    W: AsyncWrite + Unpin,
{
    info!("Writer stage started");
    let mut written = 0usize;

    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        let frame = match tokio::time::timeout(idle_timeout, outgoing.recv()).await {
            Err(_) => {
                trace!("Outgoing queue idle");
                continue;
            }
            Ok(None) => {
                debug!("Outgoing queue closed");
                break Ok(());
            }
            Ok(Some(frame)) => frame,
        };

        if frame.is_empty() {
            continue;
        }

        debug!("Sending {}", frame);
        if let Err(e) = write_frame(&mut writer, &frame).await {
            error!("Socket write failed: {}", e);
            cancel.cancel();
            break Err(PipelineError::Transport(e));
        }
        written += 1;
    };

    info!("Writer stage stopped after {} frames", written);
    result
}

async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandEncoder;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writes_frames_in_queue_order() {
        let (mut panel, socket) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let encoder = CommandEncoder::default();

        tx.send(encoder.window_action(2, 'o').unwrap()).await.unwrap();
        tx.send(Frame::wake_up()).await.unwrap();
        tx.send(encoder.status_poll()).await.unwrap();
        drop(tx);

        run_writer(socket, rx, cancel, Duration::from_millis(50))
            .await
            .unwrap();

        let mut received = vec![0u8; 10];
        panel.read_exact(&mut received).await.unwrap();
        assert_eq!(
            received,
            vec![0xFF, 0x01, 0x02, 0x55, 0x58, 0xFF, 0x01, 0x05, 0x5C, 0x62]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn observes_stop_flag_while_idle() {
        let (_panel, socket) = tokio::io::duplex(64);
        let (_tx, rx) = mpsc::channel::<Frame>(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_writer(
            socket,
            rx,
            cancel.clone(),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(3), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn write_failure_cancels_pipeline() {
        let (panel, socket) = tokio::io::duplex(64);
        drop(panel);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(CommandEncoder::default().status_poll()).await.unwrap();
        let result = run_writer(socket, rx, cancel.clone(), Duration::from_millis(50)).await;

        assert!(matches!(result, Err(PipelineError::Transport(_))));
        assert!(cancel.is_cancelled());
    }
}
