use std::time::Duration;

use rumqttc::{LastWill, MqttOptions, QoS};
use serde::{Deserialize, Serialize};

pub const AVAILABILITY_ONLINE: &str = "online";
pub const AVAILABILITY_OFFLINE: &str = "offline";

/// Broker connection settings (`[mqtt]` section)
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Root of all topics; windows default to `{base_topic}/{name}`
    pub base_topic: String,
    pub reconnect_delay_ms: u64,
    /// Capacity of the client's request queue
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "window-mqtt-bridge".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            base_topic: "windows".to_string(),
            reconnect_delay_ms: 2000,
            request_capacity: 100,
        }
    }
}

impl MqttConfig {
    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.base_topic)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn options(&self) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        mqtt_options
            .set_keep_alive(Duration::from_secs(self.keep_alive_secs))
            .set_clean_session(true)
            .set_last_will(LastWill::new(
                self.availability_topic(),
                AVAILABILITY_OFFLINE,
                QoS::AtLeastOnce,
                true,
            ));

        if let Some(username) = &self.username {
            mqtt_options.set_credentials(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            );
        }

        mqtt_options
    }
}
