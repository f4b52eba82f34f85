//! Hotkey module for global key combinations
//!
//! Provides the platform-neutral modifier/key descriptors and the
//! per-hotkey controller that drives registration through a backend.

mod controller;
mod keys;

pub use controller::Hotkey;
pub use keys::{Key, Modifier, Modifiers};
