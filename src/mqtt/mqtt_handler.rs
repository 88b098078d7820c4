//! MQTT client lifecycle and event loop
//!
//! The bridge is a statum state machine:
//!
//! ```text
//! Idle ──connect()──► Connected ──shutdown()──► (offline published, task joined)
//! ```
//!
//! Connecting spawns one tokio task that drives the rumqttc event loop and
//! forwards everything it sees to a [`BridgeAdapter`] through the
//! [`BridgeEvents`] callbacks.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::{MqttConfig, AVAILABILITY_OFFLINE, AVAILABILITY_ONLINE};
use super::message_manager::CommandRoutes;
use super::{BridgeError, BridgeEvents, StatePublisher};
use crate::protocol::{CommandEncoder, Frame, WindowAction, WindowSelector};
use crate::window::SharedWindow;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Idle,      // Client created, event loop not yet running
    Connected, // Event loop task running
}

#[machine]
pub struct MqttBridge<S: BridgeState> {
    config: MqttConfig,
    windows: Vec<SharedWindow>,
    routes: CommandRoutes,
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    event_task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<S: BridgeState> MqttBridge<S> {
    pub fn routes(&self) -> &CommandRoutes {
        &self.routes
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }
}

impl MqttBridge<Idle> {
    /// Creates the client and the command routing table for `windows`.
    ///
    /// Nothing touches the network until [`connect`](Self::connect).
    pub async fn create(config: MqttConfig, windows: Vec<SharedWindow>) -> Self {
        info!(
            "Creating MQTT bridge for {}:{} as {}",
            config.host, config.port, config.client_id
        );

        let mut routes = CommandRoutes::new();
        for window in &windows {
            let window = window.lock().await;
            routes.add(window.topic_prefix(), window.number());
        }
        debug!("Registered {} command topics", routes.len());

        let (client, event_loop) = AsyncClient::new(config.options(), config.request_capacity);

        Self::new(
            config,
            windows,
            routes,
            client,
            Some(event_loop),
            None,
            CancellationToken::new(),
        )
    }

    /// Spawns the event loop task; inbound commands are encoded and pushed to `outgoing`.
    pub fn connect(
        mut self,
        encoder: CommandEncoder,
        outgoing: mpsc::Sender<Frame>,
    ) -> Result<MqttBridge<Connected>, BridgeError> {
        let event_loop = self.event_loop.take().ok_or(BridgeError::AlreadyConnected)?;

        let adapter = BridgeAdapter {
            client: self.client.clone(),
            routes: self.routes.clone(),
            availability_topic: self.config.availability_topic(),
            encoder,
            outgoing,
        };

        let shutdown = self.shutdown.clone();
        let reconnect_delay = self.config.reconnect_delay();
        self.event_task = Some(tokio::spawn(async move {
            run_event_loop(event_loop, adapter, shutdown, reconnect_delay).await;
        }));

        info!("MQTT event loop started");
        Ok(self.transition())
    }
}

impl MqttBridge<Connected> {
    /// Publisher used by the processor stage after each STATUS frame
    pub fn publisher(&self) -> StatePublisher<AsyncClient> {
        StatePublisher::new(self.windows.clone(), self.client.clone())
    }

    /// Marks the bridge offline, disconnects and waits for the event loop to finish.
    pub async fn shutdown(mut self) -> Result<(), BridgeError> {
        info!("Shutting down MQTT bridge");

        let availability = self.config.availability_topic();
        let publish_result = self
            .client
            .publish(availability, QoS::AtLeastOnce, true, AVAILABILITY_OFFLINE)
            .await;
        let disconnect_result = self.client.disconnect().await;

        if let Some(mut task) = self.event_task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("MQTT event loop did not stop in time, cancelling");
                self.shutdown.cancel();
                if let Err(e) = task.await {
                    error!("MQTT event loop task failed: {}", e);
                }
            }
        }

        publish_result?;
        disconnect_result?;
        info!("MQTT bridge stopped");
        Ok(())
    }
}

/// Connects broker events to the command queue
pub struct BridgeAdapter {
    client: AsyncClient,
    routes: CommandRoutes,
    availability_topic: String,
    encoder: CommandEncoder,
    outgoing: mpsc::Sender<Frame>,
}

impl BridgeEvents for BridgeAdapter {
    /// Queues the subscriptions and the `online` marker from a separate task.
    ///
    /// This runs inside the event loop, which is the only consumer of the
    /// client's request queue; awaiting a full queue here would never return.
    async fn on_connect(&self) -> Result<(), BridgeError> {
        let client = self.client.clone();
        let topics: Vec<String> = self.routes.topics().map(str::to_string).collect();
        let availability_topic = self.availability_topic.clone();

        tokio::spawn(async move {
            let count = topics.len();
            if let Err(e) = announce(&client, topics, availability_topic).await {
                error!("Failed to queue subscriptions after connect: {}", e);
                return;
            }
            info!("MQTT connected, subscribed to {} command topics", count);
        });

        Ok(())
    }

    fn on_close(&self) {
        info!("MQTT connection closed");
    }

    fn on_error(&self, error: &BridgeError) {
        error!("MQTT error: {}", error);
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        let Some(window) = self.routes.resolve(topic) else {
            trace!("Ignoring message on unrouted topic {}", topic);
            return Ok(());
        };

        let text = String::from_utf8_lossy(payload);
        let command = text
            .parse::<WindowAction>()
            .and_then(|action| Ok((WindowSelector::try_from(window)?, action)));

        let (selector, action) = match command {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping command {:?} for window {}: {}", text, window, e);
                return Ok(());
            }
        };

        let frame = self.encoder.encode(crate::protocol::Command::Move {
            window: selector,
            action,
        });
        info!("Received {} command for {}, queueing {}", action, selector, frame);

        self.outgoing
            .send(frame)
            .await
            .map_err(|_| BridgeError::CommandQueueClosed)
    }
}

async fn announce(
    client: &AsyncClient,
    topics: Vec<String>,
    availability_topic: String,
) -> Result<(), BridgeError> {
    for topic in topics {
        debug!("Subscribing to {}", topic);
        client.subscribe(topic, QoS::AtLeastOnce).await?;
    }

    client
        .publish(availability_topic, QoS::AtLeastOnce, true, AVAILABILITY_ONLINE)
        .await?;
    Ok(())
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    adapter: BridgeAdapter,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
) {
    info!("Entering MQTT event loop");
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    if let Err(e) = adapter.on_connect().await {
                        adapter.on_error(&e);
                    }
                } else {
                    warn!("Broker refused connection: {:?}", ack.code);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Err(e) = adapter.on_message(&publish.topic, &publish.payload).await {
                    adapter.on_error(&e);
                    if matches!(e, BridgeError::CommandQueueClosed) {
                        break;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => adapter.on_close(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                adapter.on_close();
                break;
            }
            Ok(other) => trace!("MQTT event: {:?}", other),
            Err(e) => {
                adapter.on_error(&BridgeError::from(e));
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }
    info!("MQTT event loop finished");
}
