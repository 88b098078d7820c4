//! Per-window status with dirty tracking
//!
//! Each STATUS frame carries one byte per window. Bits 0-5 are a hardware
//! defined contract; bits 6 and 7 are unused:
//!
//! ```text
//! bit  5                 4            3          2               1                     0
//!     [rain override]  [rain sensed] [rf heard] [screen missing] [movement obstructed] [open]
//! ```
//!
//! Every observable field has its own dirty flag so the MQTT side only
//! publishes what actually changed. All flags start set, which forces the very
//! first publish, and are cleared together once a publish pass succeeded.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Observable fields of a window, in publish order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowField {
    Open,
    MovementObstructed,
    ScreenMissing,
    RfHeard,
    RainSensed,
    RainOverrideActive,
    LastPolled,
}

impl WindowField {
    pub const ALL: [WindowField; 7] = [
        WindowField::Open,
        WindowField::MovementObstructed,
        WindowField::ScreenMissing,
        WindowField::RfHeard,
        WindowField::RainSensed,
        WindowField::RainOverrideActive,
        WindowField::LastPolled,
    ];

    /// Topic segment appended to the window prefix
    pub fn topic_suffix(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::MovementObstructed => "movement_obstructed",
            Self::ScreenMissing => "screen_missing",
            Self::RfHeard => "rf_heard",
            Self::RainSensed => "rain_sensed",
            Self::RainOverrideActive => "rain_override_active",
            Self::LastPolled => "last_polled",
        }
    }

    /// Bit position inside the status byte, `None` for derived fields
    pub fn status_bit(self) -> Option<u8> {
        match self {
            Self::Open => Some(0),
            Self::MovementObstructed => Some(1),
            Self::ScreenMissing => Some(2),
            Self::RfHeard => Some(3),
            Self::RainSensed => Some(4),
            Self::RainOverrideActive => Some(5),
            Self::LastPolled => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Decoded value of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Flag(bool),
    Timestamp(DateTime<Utc>),
}

/// The six boolean flags carried by a status byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub open: bool,
    pub movement_obstructed: bool,
    pub screen_missing: bool,
    pub rf_heard: bool,
    pub rain_sensed: bool,
    pub rain_override_active: bool,
}

impl StatusFlags {
    pub fn from_byte(status: u8) -> Self {
        let bit = |n: u8| status & (1 << n) != 0;
        Self {
            open: bit(0),
            movement_obstructed: bit(1),
            screen_missing: bit(2),
            rf_heard: bit(3),
            rain_sensed: bit(4),
            rain_override_active: bit(5),
        }
    }

    pub fn get(&self, field: WindowField) -> Option<bool> {
        match field {
            WindowField::Open => Some(self.open),
            WindowField::MovementObstructed => Some(self.movement_obstructed),
            WindowField::ScreenMissing => Some(self.screen_missing),
            WindowField::RfHeard => Some(self.rf_heard),
            WindowField::RainSensed => Some(self.rain_sensed),
            WindowField::RainOverrideActive => Some(self.rain_override_active),
            WindowField::LastPolled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyFlags([bool; 7]);

impl DirtyFlags {
    fn all_set() -> Self {
        Self([true; 7])
    }

    fn set(&mut self, field: WindowField) {
        self.0[field.index()] = true;
    }

    fn is_set(&self, field: WindowField) -> bool {
        self.0[field.index()]
    }

    fn any(&self) -> bool {
        self.0.iter().any(|&flag| flag)
    }

    fn clear(&mut self) {
        self.0 = [false; 7];
    }
}

/// State of one physical window as last reported by the panel
#[derive(Debug, Clone)]
pub struct WindowState {
    name: String,
    number: u8,
    topic_prefix: String,
    status: StatusFlags,
    last_polled: DateTime<Utc>,
    last_updated: Option<Instant>,
    dirty: DirtyFlags,
}

impl WindowState {
    pub fn new(name: impl Into<String>, number: u8, topic_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number,
            topic_prefix: topic_prefix.into(),
            status: StatusFlags::default(),
            last_polled: Utc::now(),
            last_updated: None,
            dirty: DirtyFlags::all_set(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn status(&self) -> StatusFlags {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.open
    }

    pub fn is_movement_obstructed(&self) -> bool {
        self.status.movement_obstructed
    }

    pub fn is_screen_missing(&self) -> bool {
        self.status.screen_missing
    }

    pub fn is_rf_heard(&self) -> bool {
        self.status.rf_heard
    }

    pub fn is_rain_sensed(&self) -> bool {
        self.status.rain_sensed
    }

    pub fn is_rain_override_active(&self) -> bool {
        self.status.rain_override_active
    }

    pub fn last_polled(&self) -> DateTime<Utc> {
        self.last_polled
    }

    /// When the panel last reported on this window, changed or not
    pub fn last_updated(&self) -> Option<Instant> {
        self.last_updated
    }

    pub fn value(&self, field: WindowField) -> FieldValue {
        match self.status.get(field) {
            Some(flag) => FieldValue::Flag(flag),
            None => FieldValue::Timestamp(self.last_polled),
        }
    }

    pub fn is_dirty(&self, field: WindowField) -> bool {
        self.dirty.is_set(field)
    }

    pub fn has_pending_changes(&self) -> bool {
        self.dirty.any()
    }

    /// Applies a status byte, returning how many fields changed value.
    pub fn set_status(&mut self, status_byte: u8) -> usize {
        self.set_status_at(status_byte, Utc::now())
    }

    pub fn set_status_at(&mut self, status_byte: u8, now: DateTime<Utc>) -> usize {
        debug!(
            "Updating status (0x{:02X}) for window {}: {}",
            status_byte, self.number, self.name
        );

        let decoded = StatusFlags::from_byte(status_byte);
        let mut changed = 0;
        for field in WindowField::ALL {
            if let (Some(old), Some(new)) = (self.status.get(field), decoded.get(field)) {
                if old != new {
                    self.dirty.set(field);
                    changed += 1;
                }
            }
        }

        self.status = decoded;
        self.last_updated = Some(Instant::now());

        if changed > 0 {
            self.last_polled = now;
            self.dirty.set(WindowField::LastPolled);
            debug!("Window {} changed {} fields: {}", self.number, changed, self);
        }

        changed
    }

    /// Fields that a publish pass has to send
    pub fn dirty_fields(&self, force: bool) -> Vec<WindowField> {
        WindowField::ALL
            .into_iter()
            .filter(|&field| force || self.dirty.is_set(field))
            .collect()
    }

    /// Full topic for one field of this window
    pub fn topic(&self, field: WindowField) -> String {
        format!("{}/{}", self.topic_prefix, field.topic_suffix())
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (#{}) open={} obstructed={} screen_missing={} rf_heard={} rain={} rain_override={} last_polled={}",
            self.name,
            self.number,
            self.status.open,
            self.status.movement_obstructed,
            self.status.screen_missing,
            self.status.rf_heard,
            self.status.rain_sensed,
            self.status.rain_override_active,
            self.last_polled.format("%Y-%m-%dT%H:%M:%SZ"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> WindowState {
        WindowState::new("window1", 1, "home/windows/window1")
    }

    #[test]
    fn fresh_window_is_fully_dirty() {
        let window = window();
        assert!(WindowField::ALL.iter().all(|&f| window.is_dirty(f)));
        assert_eq!(window.dirty_fields(false).len(), 7);
        assert!(!window.is_open());
    }

    #[test]
    fn decodes_all_bits() {
        let mut window = window();
        window.set_status(0x3F);
        assert!(window.is_open());
        assert!(window.is_movement_obstructed());
        assert!(window.is_screen_missing());
        assert!(window.is_rf_heard());
        assert!(window.is_rain_sensed());
        assert!(window.is_rain_override_active());

        window.set_status(0x00);
        assert_eq!(window.status(), StatusFlags::default());
    }

    #[test]
    fn unused_high_bits_are_ignored() {
        let mut window = window();
        assert_eq!(window.set_status(0xC0), 0);
        assert_eq!(window.status(), StatusFlags::default());
    }

    #[test]
    fn only_changed_fields_become_dirty() {
        let mut window = window();
        window.clear_dirty();

        assert_eq!(window.set_status(0x01), 1);
        assert_eq!(
            window.dirty_fields(false),
            vec![WindowField::Open, WindowField::LastPolled]
        );

        window.clear_dirty();
        assert_eq!(window.set_status(0x01), 0);
        assert!(!window.has_pending_changes());

        assert_eq!(window.set_status(0x11), 1);
        assert_eq!(
            window.dirty_fields(false),
            vec![WindowField::RainSensed, WindowField::LastPolled]
        );
    }

    #[test]
    fn repeated_status_keeps_flags_from_first_change() {
        let mut window = window();
        window.clear_dirty();

        window.set_status(0x01);
        window.set_status(0x01);
        assert!(window.is_dirty(WindowField::Open));
        assert!(!window.is_dirty(WindowField::RainSensed));
    }

    #[test]
    fn last_polled_moves_only_on_change() {
        let mut window = window();
        let first = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let second = DateTime::parse_from_rfc3339("2024-01-01T10:00:05Z")
            .unwrap()
            .with_timezone(&Utc);

        window.set_status_at(0x02, first);
        assert_eq!(window.last_polled(), first);

        window.set_status_at(0x02, second);
        assert_eq!(window.last_polled(), first);
        assert!(window.last_updated().is_some());
    }

    #[test]
    fn force_lists_every_field() {
        let mut window = window();
        window.clear_dirty();
        assert!(window.dirty_fields(false).is_empty());
        assert_eq!(window.dirty_fields(true), WindowField::ALL.to_vec());
    }

    #[test]
    fn topics_use_prefix() {
        let window = window();
        assert_eq!(
            window.topic(WindowField::MovementObstructed),
            "home/windows/window1/movement_obstructed"
        );
        assert_eq!(
            window.topic(WindowField::LastPolled),
            "home/windows/window1/last_polled"
        );
    }
}
