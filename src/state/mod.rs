//! Registration state machine
//!
//! Provides the per-hotkey registration lifecycle:
//! - Unregistered: no native grab, ready to register
//! - Registering: transient, backend call in progress
//! - Registered: native grab live, events flowing
//! - Unregistering: transient, backend release in progress

mod machine;

pub use machine::State;
