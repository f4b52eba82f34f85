//! Native backend contract
//!
//! A backend grabs one modifier/key combination at the OS level and later
//! reports presses through the [`Dispatcher`] it was given. Controllers and
//! the scheduler stay platform-agnostic; the platform variant is picked at
//! build time by [`native`].

mod memory;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(target_os = "macos"))]
mod unsupported;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatcher;
use crate::handle::Handle;
use crate::hotkey::{Key, Modifiers};

pub use memory::MemoryBackend;
#[cfg(target_os = "macos")]
pub use macos::EventTapBackend;
#[cfg(not(target_os = "macos"))]
pub use unsupported::UnsupportedBackend;

/// Opaque reference to a live native registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeRef(u64);

impl NativeRef {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("combination is already claimed by another registrant")]
    Conflict,

    #[error("rejected by the system: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("native reference is not active")]
    NotActive,
}

/// Per-platform hotkey primitive
///
/// Callbacks may be fired from any thread, including before `register` has
/// returned. Once `unregister` returns `Ok`, the backend must not fire any
/// further callback for that registration: the handle is freed right after.
pub trait Backend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Check that the environment supports this backend
    ///
    /// Runs once when a [`Registry`](crate::Registry) is built.
    fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Whether `register`/`unregister` must run on the main thread
    fn requires_main_thread(&self) -> bool {
        false
    }

    /// Grab the combination and report its signals for `handle`
    fn register(
        &self,
        modifiers: Modifiers,
        key: Key,
        handle: Handle,
        dispatcher: Dispatcher,
    ) -> Result<NativeRef, BackendError>;

    /// Release a registration made by this backend
    fn unregister(&self, native: NativeRef) -> Result<(), BackendError>;
}

/// The backend for the platform this crate was built for
#[cfg(target_os = "macos")]
pub fn native() -> Arc<dyn Backend> {
    Arc::new(EventTapBackend::new())
}

/// The backend for the platform this crate was built for
#[cfg(not(target_os = "macos"))]
pub fn native() -> Arc<dyn Backend> {
    Arc::new(UnsupportedBackend::new())
}
