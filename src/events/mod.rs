//! Hotkey event types
//!
//! An [`Event`] carries no payload; only its arrival and ordering matter.
//! [`SignalKind`] tells the dispatcher which relay an event belongs to.

use serde::{Deserialize, Serialize};

/// A single hotkey occurrence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event;

/// The kind of native signal delivered for a registered hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// The combination was pressed
    KeyDown,
    /// The combination was released
    KeyUp,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::KeyDown => write!(f, "KEYDOWN"),
            SignalKind::KeyUp => write!(f, "KEYUP"),
        }
    }
}
