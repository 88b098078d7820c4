//! # MQTT Bridge
//!
//! Connects the window model to a home-automation MQTT broker. Window state is
//! published as retained `yes`/`no` values per field, and single-character
//! commands received on each window's command topic are turned into panel
//! frames on the outgoing queue.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker connection settings
//! ├── message_manager.rs  - topic layout, payload formatting, command routing
//! ├── publisher.rs        - dirty-flag driven publish pass over all windows
//! └── mqtt_handler.rs     - rumqttc client lifecycle and event loop
//! ```
//!
//! The pipeline only sees the [`WindowPublisher`] trait. The rumqttc client is
//! hidden behind [`MessageSink`] and the event loop talks to the rest of the
//! system through [`BridgeEvents`].

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
pub mod publisher;

use std::future::Future;

use thiserror::Error;

pub use message_manager::{CommandRoutes, StateMessage};
pub use mqtt_handler::MqttBridge;
pub use publisher::{PublishSummary, StatePublisher};

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The client refused a request (its request queue is gone)
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Broker connection failed or dropped
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// The outgoing frame queue has been closed by the pipeline
    #[error("Command queue closed")]
    CommandQueueClosed,

    /// A message sink rejected a publish
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// The bridge was asked to connect twice
    #[error("Bridge already connected")]
    AlreadyConnected,
}

/// Publishes window state after the processor applied a STATUS frame
pub trait WindowPublisher {
    /// Publishes every dirty field of every window, or every field when `force` is set.
    fn publish_windows(
        &self,
        force: bool,
    ) -> impl Future<Output = Result<PublishSummary, BridgeError>> + Send;
}

/// Destination for individual state messages
pub trait MessageSink {
    fn send(&self, message: StateMessage) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Callbacks driven by the MQTT event loop
pub trait BridgeEvents {
    fn on_connect(&self) -> impl Future<Output = Result<(), BridgeError>> + Send;

    fn on_close(&self);

    fn on_error(&self, error: &BridgeError);

    fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}
