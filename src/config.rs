//! Bridge configuration, loaded from a single TOML file.
//!
//! ```toml
//! [panel]
//! host = "192.168.1.50"
//! port = 4001
//!
//! [mqtt]
//! host = "broker.local"
//! base_topic = "home/windows"
//!
//! [[windows]]
//! name = "kitchen"
//! number = 1
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Every section and key is optional and falls back to its default.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, Level};

use crate::mqtt::config::MqttConfig;
use crate::pipeline::PipelineSettings;
use crate::protocol::{CommandEncoder, DST_PANEL, MAX_WINDOW, SRC_CONTROLLER};
use crate::window::{shared, SharedWindow, WindowState};

pub const CONFIG_ENV: &str = "WINDOW_BRIDGE_CONFIG";
const CONFIG_DIR: &str = "window-mqtt-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available on this system")]
    NoConfigDir,

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Panel socket and pipeline timing (`[panel]` section)
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    pub host: String,
    pub port: u16,
    pub controller_address: u8,
    pub panel_address: u8,
    pub poll_interval_secs: u64,
    pub writer_timeout_ms: u64,
    /// 0 disables dropping of stale partial frames
    pub frame_timeout_ms: u64,
    pub queue_capacity: usize,
    pub read_buffer_size: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4001,
            controller_address: SRC_CONTROLLER,
            panel_address: DST_PANEL,
            poll_interval_secs: 5,
            writer_timeout_ms: 1000,
            frame_timeout_ms: 2000,
            queue_capacity: 256,
            read_buffer_size: 1024,
        }
    }
}

impl PanelConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One `[[windows]]` entry
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct WindowConfig {
    pub name: String,
    pub number: u8,
    /// Overrides the default `{base_topic}/{name}` prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        self.level
            .trim()
            .parse::<Level>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub panel: PanelConfig,
    pub mqtt: MqttConfig,
    pub windows: Vec<WindowConfig>,
    pub logging: LoggingConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            panel: PanelConfig::default(),
            mqtt: MqttConfig::default(),
            windows: (1..=MAX_WINDOW)
                .map(|number| WindowConfig {
                    name: format!("window{}", number),
                    number,
                    topic: None,
                })
                .collect(),
            logging: LoggingConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`. A missing file is created with defaults when `create_missing` is set.
    pub async fn load(path: &Path, create_missing: bool) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| io_error(path, source))?;

        if !exists && create_missing {
            info!("No config at {}, writing defaults", path.display());
            let config = BridgeConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        debug!("Reading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| io_error(path, source))?;
        Self::from_toml(&content, path)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| io_error(path, source))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.panel.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.panel.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".into()));
        }
        if self.mqtt.request_capacity == 0 {
            return Err(ConfigError::Invalid("mqtt request_capacity must be > 0".into()));
        }
        if self.panel.writer_timeout_ms == 0 {
            return Err(ConfigError::Invalid("writer_timeout_ms must be > 0".into()));
        }
        if self.windows.is_empty() {
            return Err(ConfigError::Invalid("at least one window is required".into()));
        }

        let mut seen = HashSet::new();
        for window in &self.windows {
            if window.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "window {} has an empty name",
                    window.number
                )));
            }
            if !(1..=MAX_WINDOW).contains(&window.number) {
                return Err(ConfigError::Invalid(format!(
                    "window '{}' has number {}, expected 1..={}",
                    window.name, window.number, MAX_WINDOW
                )));
            }
            if !seen.insert(window.number) {
                return Err(ConfigError::Invalid(format!(
                    "window number {} is used twice",
                    window.number
                )));
            }
        }

        self.logging.max_level()?;
        Ok(())
    }

    pub fn topic_prefix(&self, window: &WindowConfig) -> String {
        match &window.topic {
            Some(topic) => topic.trim_end_matches('/').to_string(),
            None => format!("{}/{}", self.mqtt.base_topic, window.name),
        }
    }

    pub fn build_windows(&self) -> Vec<SharedWindow> {
        self.windows
            .iter()
            .map(|window| {
                shared(WindowState::new(
                    window.name.clone(),
                    window.number,
                    self.topic_prefix(window),
                ))
            })
            .collect()
    }

    pub fn encoder(&self) -> CommandEncoder {
        CommandEncoder::new(self.panel.controller_address, self.panel.panel_address)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let frame_timeout = match self.panel.frame_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        PipelineSettings {
            poll_interval: Duration::from_secs(self.panel.poll_interval_secs),
            writer_timeout: Duration::from_millis(self.panel.writer_timeout_ms),
            frame_timeout,
            queue_capacity: self.panel.queue_capacity,
            read_buffer_size: self.panel.read_buffer_size,
        }
    }
}

/// First CLI argument, then `$WINDOW_BRIDGE_CONFIG`, then the user config dir.
///
/// The flag tells whether the default location was chosen.
pub fn resolve_config_path(cli_arg: Option<String>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = cli_arg {
        return Ok((PathBuf::from(path), false));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok((PathBuf::from(path), false));
        }
    }
    default_config_path().map(|path| (path, true))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}
