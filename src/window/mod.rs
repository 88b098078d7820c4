//! # Window Model
//!
//! One [`WindowState`] exists per physical window for the whole process
//! lifetime. The processor stage writes it, the MQTT publisher reads it and
//! clears its dirty flags; both run on different tasks, so every window sits
//! behind its own async mutex. No operation ever holds two window locks.

pub mod state;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use state::{FieldValue, StatusFlags, WindowField, WindowState};

/// Window state shared between the processor stage and the MQTT bridge
pub type SharedWindow = Arc<Mutex<WindowState>>;

pub fn shared(window: WindowState) -> SharedWindow {
    Arc::new(Mutex::new(window))
}
