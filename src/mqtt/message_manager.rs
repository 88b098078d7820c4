//! Topic layout and payload formatting for window state and commands

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::window::{FieldValue, WindowState};

pub const COMMAND_SUFFIX: &str = "command";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One retained state publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl fmt::Display for StateMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.topic, self.payload)
    }
}

impl StateMessage {
    pub fn from_topic(topic: String, payload: String) -> Self {
        StateMessage {
            topic,
            payload,
            retain: true,
        }
    }

    /// Messages a publish pass has to send for `window`
    pub fn for_window(window: &WindowState, force: bool) -> Vec<Self> {
        window
            .dirty_fields(force)
            .into_iter()
            .map(|field| Self::from_topic(window.topic(field), format_value(window.value(field))))
            .collect()
    }
}

pub fn format_value(value: FieldValue) -> String {
    match value {
        FieldValue::Flag(flag) => format_flag(flag).to_string(),
        FieldValue::Timestamp(timestamp) => format_timestamp(timestamp),
    }
}

pub fn format_flag(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn command_topic(topic_prefix: &str) -> String {
    format!("{}/{}", topic_prefix, COMMAND_SUFFIX)
}

/// Maps each window's command topic to its window number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRoutes {
    routes: HashMap<String, u8>,
}

impl CommandRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, topic_prefix: &str, window: u8) {
        self.routes.insert(command_topic(topic_prefix), window);
    }

    pub fn resolve(&self, topic: &str) -> Option<u8> {
        self.routes.get(topic).copied()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowField;

    #[test]
    fn fresh_window_publishes_every_field() {
        let window = WindowState::new("kitchen", 2, "windows/kitchen");
        let messages = StateMessage::for_window(&window, false);

        let topics: Vec<_> = messages.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec![
                "windows/kitchen/open",
                "windows/kitchen/movement_obstructed",
                "windows/kitchen/screen_missing",
                "windows/kitchen/rf_heard",
                "windows/kitchen/rain_sensed",
                "windows/kitchen/rain_override_active",
                "windows/kitchen/last_polled",
            ]
        );
        assert!(messages.iter().all(|m| m.retain));
        assert_eq!(messages[0].payload, "no");
    }

    #[test]
    fn booleans_and_timestamps_are_formatted() {
        let mut window = WindowState::new("kitchen", 2, "windows/kitchen");
        window.clear_dirty();
        let at = DateTime::parse_from_rfc3339("2024-11-23T08:15:30Z")
            .unwrap()
            .with_timezone(&Utc);
        window.set_status_at(0x08, at);

        let messages = StateMessage::for_window(&window, false);
        assert_eq!(
            messages,
            vec![
                StateMessage::from_topic("windows/kitchen/rf_heard".into(), "yes".into()),
                StateMessage::from_topic(
                    "windows/kitchen/last_polled".into(),
                    "2024-11-23T08:15:30Z".into()
                ),
            ]
        );
        assert_eq!(window.value(WindowField::RfHeard), FieldValue::Flag(true));
    }

    #[test]
    fn routes_resolve_command_topics() {
        let mut routes = CommandRoutes::new();
        routes.add("windows/window1", 1);
        routes.add("windows/window2", 2);

        assert_eq!(routes.resolve("windows/window2/command"), Some(2));
        assert_eq!(routes.resolve("windows/window2/open"), None);
        assert_eq!(routes.len(), 2);
    }
}
