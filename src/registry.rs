//! Hotkey registry
//!
//! The registry is the context object every controller is created from. It
//! owns the backend, the dispatcher (and with it the handle table) and the
//! optional main-thread scheduler. Independent registries never share
//! handles, so tests can run side by side.

use std::sync::Arc;

use tracing::info;

use crate::backend::{Backend, BackendError};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::hotkey::{Hotkey, Key, Modifiers};
use crate::mainthread::Scheduler;

struct Inner {
    backend: Arc<dyn Backend>,
    dispatcher: Dispatcher,
    scheduler: Option<Scheduler>,
}

/// Shared context for creating and registering hotkeys
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Create a registry without a main-thread scheduler
    ///
    /// Fails with [`Error::UnsupportedEnvironment`] if the backend's probe
    /// fails.
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::build(backend, None)
    }

    /// Create a registry that routes backend calls through `scheduler`
    /// whenever the backend requires the main thread
    pub fn with_scheduler(backend: Arc<dyn Backend>, scheduler: Scheduler) -> Result<Self> {
        Self::build(backend, Some(scheduler))
    }

    fn build(backend: Arc<dyn Backend>, scheduler: Option<Scheduler>) -> Result<Self> {
        backend.probe().map_err(|err| match err {
            BackendError::Unavailable(reason) => Error::UnsupportedEnvironment(reason),
            other => Error::UnsupportedEnvironment(other.to_string()),
        })?;

        info!(
            backend = backend.name(),
            main_thread = backend.requires_main_thread(),
            scheduler = scheduler.is_some(),
            "hotkey registry ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                dispatcher: Dispatcher::new(),
                scheduler,
            }),
        })
    }

    /// Create an unregistered hotkey for `modifiers` + `key`
    pub fn hotkey(&self, modifiers: impl Into<Modifiers>, key: Key) -> Hotkey {
        Hotkey::new(self.clone(), modifiers.into(), key)
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Number of handles currently held by the backend
    pub fn live_handles(&self) -> usize {
        self.inner.dispatcher.live_handles()
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Run `op` against the backend, on the main thread if it demands so
    pub(crate) fn on_backend<F, R>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&dyn Backend) -> R + Send + 'static,
        R: Send + 'static,
    {
        let backend = Arc::clone(&self.inner.backend);
        if !backend.requires_main_thread() {
            return Ok(op(backend.as_ref()));
        }

        match &self.inner.scheduler {
            Some(scheduler) => scheduler.call(move || op(backend.as_ref())),
            None => Err(Error::UnsupportedEnvironment(format!(
                "{} backend must run on the main thread, but no scheduler was provided",
                backend.name()
            ))),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend_name())
            .field("dispatcher", &self.inner.dispatcher)
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}
