pub mod config;
pub mod mqtt;
pub mod pipeline;
pub mod protocol;
pub mod window;

use color_eyre::{eyre::eyre, Result};
use tokio::net::TcpStream;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{resolve_config_path, BridgeConfig};
use crate::mqtt::MqttBridge;
use crate::pipeline::{AppContext, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let (config_path, is_default) = resolve_config_path(std::env::args().nth(1))?;
    let config = BridgeConfig::load(&config_path, is_default).await?;
    setup_logging(config.logging.max_level()?);
    info!("Loaded config from {}", config_path.display());

    let windows = config.build_windows();
    let context = AppContext::new(windows.clone(), config.pipeline_settings(), config.encoder());
    let pipeline = Pipeline::create(context);

    let bridge = MqttBridge::create(config.mqtt.clone(), windows).await;
    let bridge = bridge.connect(config.encoder(), pipeline.command_sender())?;

    let address = config.panel.address();
    info!("Connecting to panel at {}", address);
    let stream = match TcpStream::connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            if let Err(shutdown_err) = bridge.shutdown().await {
                warn!("MQTT shutdown failed: {}", shutdown_err);
            }
            return Err(eyre!("Failed to connect to panel at {}: {}", address, e));
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Could not disable Nagle on panel socket: {}", e);
    }

    let (socket_read, socket_write) = stream.into_split();
    let pipeline = pipeline.start(socket_read, socket_write, bridge.publisher())?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        },
        _ = pipeline.stopped() => warn!("Pipeline stopped on its own"),
    }

    let stopped = pipeline.shutdown().await;
    if let Err(e) = bridge.shutdown().await {
        warn!("MQTT shutdown failed: {}", e);
    }

    for (stage, failure) in stopped.failures() {
        error!("{} stage failed: {}", stage, failure);
    }
    stopped.into_result()?;

    info!("Bridge stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
