//! # Panel Pipeline
//!
//! Four tokio tasks share one panel connection:
//!
//! ```text
//!            ┌────────┐  incoming  ┌───────────┐  WindowPublisher
//! socket ──► │ reader │ ─────────► │ processor │ ─────────────────► MQTT
//!            └────────┘            └───────────┘
//!            ┌────────┐  outgoing  ┌────────┐
//! socket ◄── │ writer │ ◄───────── │ poller │  (and MQTT commands)
//!            └────────┘            └────────┘
//! ```
//!
//! All stages watch the same [`CancellationToken`]. A transport failure in the
//! reader or writer cancels it, which brings the remaining stages down.

pub mod dispatcher;
pub mod poller;
pub mod processor;
pub mod reader;
pub mod writer;

use std::fmt;
use std::time::Duration;

use statum::{machine, state};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mqtt::WindowPublisher;
use crate::protocol::{CommandEncoder, Frame};
use crate::window::SharedWindow;

pub use dispatcher::{Dispatched, MessageDispatcher};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Connection closed by panel")]
    ConnectionClosed,

    #[error("{0} stage failed: {1}")]
    StageFailed(Stage, String),

    #[error("Pipeline already started")]
    AlreadyStarted,
}

/// Names the task a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reader,
    Writer,
    Processor,
    Poller,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Reader => "Reader",
            Stage::Writer => "Writer",
            Stage::Processor => "Processor",
            Stage::Poller => "Poller",
        };
        write!(f, "{}", name)
    }
}

/// Timing and sizing of the pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    /// Upper bound for one writer dequeue, which is how fast it notices a stop
    pub writer_timeout: Duration,
    /// Partial frames older than this are dropped; `None` keeps them forever
    pub frame_timeout: Option<Duration>,
    pub queue_capacity: usize,
    pub read_buffer_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            writer_timeout: Duration::from_millis(1000),
            frame_timeout: Some(Duration::from_millis(2000)),
            queue_capacity: 256,
            read_buffer_size: 1024,
        }
    }
}

/// Everything the stages share
#[derive(Debug, Clone)]
pub struct AppContext {
    pub windows: Vec<SharedWindow>,
    pub settings: PipelineSettings,
    pub encoder: CommandEncoder,
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(windows: Vec<SharedWindow>, settings: PipelineSettings, encoder: CommandEncoder) -> Self {
        Self {
            windows,
            settings,
            encoder,
            cancel: CancellationToken::new(),
        }
    }
}

type StageHandle = (Stage, JoinHandle<Result<(), PipelineError>>);

#[state]
#[derive(Debug, Clone)]
pub enum PipelineState {
    Configured, // Queues created, no task running
    Running,    // All four stages spawned
    Stopped,    // Stages joined, failures collected
}

#[machine]
pub struct Pipeline<S: PipelineState> {
    context: AppContext,
    outgoing_tx: mpsc::Sender<Frame>,
    outgoing_rx: Option<mpsc::Receiver<Frame>>,
    tasks: Vec<StageHandle>,
    failures: Vec<(Stage, String)>,
}

impl<S: PipelineState> Pipeline<S> {
    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Producer side of the outgoing queue, for MQTT commands
    pub fn command_sender(&self) -> mpsc::Sender<Frame> {
        self.outgoing_tx.clone()
    }
}

impl Pipeline<Configured> {
    pub fn create(context: AppContext) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(context.settings.queue_capacity.max(1));
        info!(
            "Pipeline configured for {} windows, queue capacity {}",
            context.windows.len(),
            context.settings.queue_capacity
        );

        Self::new(context, outgoing_tx, Some(outgoing_rx), Vec::new(), Vec::new())
    }

    /// Spawns reader, writer, processor and poller on the given socket halves.
    pub fn start<R, W, P>(
        mut self,
        reader: R,
        writer: W,
        publisher: P,
    ) -> Result<Pipeline<Running>, PipelineError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        P: WindowPublisher + Send + Sync + 'static,
    {
        let outgoing_rx = self.outgoing_rx.take().ok_or(PipelineError::AlreadyStarted)?;
        let settings = self.context.settings.clone();
        let cancel = self.context.cancel.clone();
        let (incoming_tx, incoming_rx) = mpsc::channel(settings.queue_capacity.max(1));

        self.tasks.push((
            Stage::Reader,
            tokio::spawn(reader::run_reader(
                reader,
                incoming_tx,
                cancel.clone(),
                settings.read_buffer_size,
                settings.frame_timeout,
            )),
        ));

        self.tasks.push((
            Stage::Writer,
            tokio::spawn(writer::run_writer(
                writer,
                outgoing_rx,
                cancel.clone(),
                settings.writer_timeout,
            )),
        ));

        let dispatcher = MessageDispatcher::new(self.context.windows.clone());
        let processor_cancel = cancel.clone();
        self.tasks.push((
            Stage::Processor,
            tokio::spawn(async move {
                processor::run_processor(incoming_rx, dispatcher, publisher, processor_cancel).await;
                Ok(())
            }),
        ));

        let poll_tx = self.outgoing_tx.clone();
        let encoder = self.context.encoder;
        self.tasks.push((
            Stage::Poller,
            tokio::spawn(async move {
                poller::run_poller(poll_tx, encoder, settings.poll_interval, cancel).await;
                Ok(())
            }),
        ));

        info!("Pipeline started");
        Ok(self.transition())
    }
}

impl Pipeline<Running> {
    /// Resolves once any stage cancelled the pipeline
    pub async fn stopped(&self) {
        self.context.cancel.cancelled().await;
    }

    pub fn is_stopping(&self) -> bool {
        self.context.cancel.is_cancelled()
    }

    /// Raises the stop flag, wakes the writer and joins every stage.
    pub async fn shutdown(mut self) -> Pipeline<Stopped> {
        info!("Stopping pipeline");
        self.context.cancel.cancel();

        if self.outgoing_tx.try_send(Frame::wake_up()).is_err() {
            debug!("Outgoing queue full or closed, writer wakes on its own timeout");
        }

        for (stage, task) in self.tasks.drain(..) {
            match task.await {
                Ok(Ok(())) => debug!("{} stage joined", stage),
                Ok(Err(e)) => {
                    warn!("{} stage ended with error: {}", stage, e);
                    self.failures.push((stage, e.to_string()));
                }
                Err(e) => {
                    error!("{} stage panicked or was aborted: {}", stage, e);
                    self.failures.push((stage, e.to_string()));
                }
            }
        }

        info!("Pipeline stopped");
        self.transition()
    }
}

impl Pipeline<Stopped> {
    /// Stage errors seen while joining, in stage order
    pub fn failures(&self) -> &[(Stage, String)] {
        &self.failures
    }

    pub fn into_result(self) -> Result<(), PipelineError> {
        match self.failures.into_iter().next() {
            Some((stage, message)) => Err(PipelineError::StageFailed(stage, message)),
            None => Ok(()),
        }
    }
}
