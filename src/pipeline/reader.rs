//! Reader stage: socket bytes → frame parser → incoming queue

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineError;
use crate::protocol::{Frame, FrameParser};

/// Reads from the panel until the connection drops or the pipeline stops.
///
/// A closed or failed connection cancels `cancel` so every other stage winds
/// down too. When `frame_timeout` is set, bytes of a partial frame that sit in
/// the parser for longer than that without any new input are discarded.
pub async fn run_reader<R>(
    mut reader: R,
    incoming: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    read_buffer_size: usize,
    frame_timeout: Option<Duration>,
) -> Result<(), PipelineError>
where
    R: AsyncRead + Unpin,
{
    info!("Reader stage started");
    let mut parser = FrameParser::new();
    let mut buffer = vec![0u8; read_buffer_size.max(1)];

    let result = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            read = read_chunk(&mut reader, &mut buffer, frame_timeout) => read,
        };

        let received = match read {
            None => {
                if parser.buffered() > 0 {
                    warn!(
                        "No data for {:?}, discarding {} bytes of a partial frame",
                        frame_timeout,
                        parser.buffered()
                    );
                    parser.discard_stale();
                }
                continue;
            }
            Some(Ok(0)) => {
                error!("Connection closed by panel");
                break Err(PipelineError::ConnectionClosed);
            }
            Some(Ok(received)) => received,
            Some(Err(e)) => {
                error!("Socket read failed: {}", e);
                break Err(PipelineError::Transport(e));
            }
        };

        debug!("Received {} bytes", received);
        let frames = parser.push(&buffer[..received]);

        let mut queue_open = true;
        for frame in frames {
            if incoming.send(frame).await.is_err() {
                queue_open = false;
                break;
            }
        }
        if !queue_open {
            debug!("Incoming queue closed");
            break Ok(());
        }
    };

    if result.is_err() {
        cancel.cancel();
    }

    info!("Reader stage stopped: {:?}", parser.stats());
    result
}

/// Reads one chunk, returning `None` when the idle timeout elapsed first
async fn read_chunk<R>(
    reader: &mut R,
    buffer: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Option<io::Result<usize>>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buffer)).await.ok(),
        None => Some(reader.read(buffer).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{checksum, MessageType};
    use tokio::io::AsyncWriteExt;

    fn status_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0x01, 0x5C, 0x01, 0x00, 0x00, 0x00];
        bytes.push(checksum::compute(&bytes));
        bytes
    }

    #[tokio::test]
    async fn forwards_frames_split_across_reads() {
        let (mut panel, socket) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reader(socket, tx, cancel.clone(), 16, None));

        let bytes = status_bytes();
        panel.write_all(&bytes[..3]).await.unwrap();
        panel.flush().await.unwrap();
        tokio::task::yield_now().await;
        panel.write_all(&bytes[3..]).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_bytes(), bytes.as_slice());
        assert_eq!(frame.message_type(), Ok(MessageType::StatusWithoutPoll));

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn closed_connection_cancels_pipeline() {
        let (panel, socket) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        drop(panel);
        let result = run_reader(socket, tx, cancel.clone(), 16, None).await;

        assert!(matches!(result, Err(PipelineError::ConnectionClosed)));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_partial_frame_is_dropped() {
        let (mut panel, socket) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reader(
            socket,
            tx,
            cancel.clone(),
            16,
            Some(Duration::from_millis(500)),
        ));

        let bytes = status_bytes();
        panel.write_all(&bytes[..5]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // The first five bytes are gone, so only the complete retransmission counts
        panel.write_all(&bytes[5..]).await.unwrap();
        panel.write_all(&bytes).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_bytes(), bytes.as_slice());
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
