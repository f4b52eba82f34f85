//! Routing of native callbacks to event relays
//!
//! A backend fires `(handle, signal)` on a thread of its own choosing,
//! possibly while holding locks of the native layer. Dispatching only takes
//! the handle table's read lock for as long as it needs to clone the
//! target, then pushes into an unbounded relay, so it never blocks on the
//! consumer and never waits on the controller.

use std::sync::Arc;

use tracing::debug;

use crate::events::{Event, SignalKind};
use crate::handle::{Handle, HandleTable};
use crate::relay::RelayInput;

/// Relay inputs of one registration epoch
#[derive(Debug, Clone)]
pub(crate) struct EpochSinks {
    pub(crate) keydown: RelayInput,
    pub(crate) keyup: RelayInput,
}

/// Entry point for native callbacks
#[derive(Clone, Default)]
pub struct Dispatcher {
    table: Arc<HandleTable<EpochSinks>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one native signal for `handle`
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not live. Backends must not fire callbacks for
    /// a registration after `unregister` has returned successfully.
    pub fn dispatch(&self, handle: Handle, signal: SignalKind) {
        let sinks = self.table.get(handle);
        let relay = match signal {
            SignalKind::KeyDown => &sinks.keydown,
            SignalKind::KeyUp => &sinks.keyup,
        };

        debug!(%handle, %signal, epoch = relay.epoch(), "hotkey signal");
        relay.push(Event);
    }

    /// Number of handles currently published to backends
    pub fn live_handles(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn publish(&self, sinks: EpochSinks) -> Handle {
        self.table.insert(sinks)
    }

    pub(crate) fn retire(&self, handle: Handle) {
        self.table.remove(handle);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("live_handles", &self.live_handles())
            .finish()
    }
}
