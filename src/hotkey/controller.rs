//! Per-hotkey registration controller
//!
//! A [`Hotkey`] owns its modifier/key descriptor, the state machine guarding
//! registration, and one pair of relays per registration epoch. The state
//! lock is only held to check and settle transitions; backend calls run
//! outside it, so a callback that arrives before `register` returns never
//! contends with the controller.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::backend::NativeRef;
use crate::dispatch::EpochSinks;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::registry::Registry;
use crate::relay::{relay, EventStream};
use crate::state::State;

use super::keys::{Key, Modifiers};

/// Relays belonging to one Register/Unregister cycle
struct Epoch {
    number: u64,
    sinks: EpochSinks,
    keydown: EventStream,
    keyup: EventStream,
}

impl Epoch {
    fn open(number: u64) -> Self {
        let (keydown_in, keydown) = relay(number);
        let (keyup_in, keyup) = relay(number);
        Self {
            number,
            sinks: EpochSinks {
                keydown: keydown_in,
                keyup: keyup_in,
            },
            keydown,
            keyup,
        }
    }
}

struct Inner {
    state: State,
    native: Option<NativeRef>,
    handle: Option<Handle>,
    epoch: Epoch,
}

/// A global modifier + key combination
///
/// Created through [`Registry::hotkey`]. Dropping a registered hotkey
/// unregisters it.
pub struct Hotkey {
    modifiers: Modifiers,
    key: Key,
    registry: Registry,
    inner: Mutex<Inner>,
}

impl Hotkey {
    pub(crate) fn new(registry: Registry, modifiers: Modifiers, key: Key) -> Self {
        Self {
            modifiers,
            key,
            registry,
            inner: Mutex::new(Inner {
                state: State::Unregistered,
                native: None,
                handle: None,
                epoch: Epoch::open(0),
            }),
        }
    }

    /// Grab the combination system-wide
    ///
    /// Fails with [`Error::AlreadyRegistered`] unless the hotkey is
    /// currently unregistered. Backend refusals come back as
    /// [`Error::NativeRegistrationFailed`] and leave the hotkey
    /// unregistered.
    pub fn register(&self) -> Result<()> {
        let handle = {
            let mut inner = self.lock();
            inner.state.begin_register()?;

            let handle = self.registry.dispatcher().publish(inner.epoch.sinks.clone());
            inner.handle = Some(handle);
            handle
        };

        let (modifiers, key) = (self.modifiers, self.key);
        let dispatcher = self.registry.dispatcher().clone();
        let outcome = self
            .registry
            .on_backend(move |backend| backend.register(modifiers, key, handle, dispatcher))
            .and_then(|registered| registered.map_err(Error::from_register));

        let mut inner = self.lock();
        match outcome {
            Ok(native) => {
                inner.native = Some(native);
                inner.state.finish_register(true);
                info!(
                    %handle,
                    ?native,
                    ?modifiers,
                    key = key.code(),
                    epoch = inner.epoch.number,
                    "hotkey registered"
                );
                Ok(())
            }
            Err(err) => {
                // The backend never took the handle, so nothing can fire on it.
                inner.handle = None;
                self.registry.dispatcher().retire(handle);
                inner.state.finish_register(false);
                warn!(%handle, ?modifiers, key = key.code(), error = %err, "hotkey registration failed");
                Err(err)
            }
        }
    }

    /// Release the combination
    ///
    /// Fails with [`Error::NotRegistered`] unless the hotkey is currently
    /// registered. On success both event streams of the current epoch end
    /// after their buffered events, and fresh streams are opened for the
    /// next registration.
    pub fn unregister(&self) -> Result<()> {
        let native = {
            let mut inner = self.lock();
            let native = match (inner.state, inner.native) {
                (State::Registered, Some(native)) => native,
                _ => return Err(Error::NotRegistered),
            };
            inner.state.begin_unregister()?;
            native
        };

        let outcome = self
            .registry
            .on_backend(move |backend| backend.unregister(native))
            .and_then(|released| released.map_err(Error::from_unregister));

        let mut inner = self.lock();
        match outcome {
            Ok(()) => {
                // The backend has confirmed silence; the handle can go.
                inner.native = None;
                if let Some(handle) = inner.handle.take() {
                    self.registry.dispatcher().retire(handle);
                }

                let next = inner.epoch.number + 1;
                let retired = std::mem::replace(&mut inner.epoch, Epoch::open(next));
                inner.state.finish_unregister(true);

                info!(?native, epoch = retired.number, "hotkey unregistered");
                Ok(())
            }
            Err(err) => {
                inner.state.finish_unregister(false);
                warn!(?native, error = %err, "hotkey unregistration failed");
                Err(err)
            }
        }
    }

    /// Stream of key-down events for the current epoch
    pub fn keydown(&self) -> EventStream {
        self.lock().epoch.keydown.clone()
    }

    /// Stream of key-up events for the current epoch
    pub fn keyup(&self) -> EventStream {
        self.lock().epoch.keyup.clone()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// Current registration state
    pub fn state(&self) -> State {
        self.lock().state
    }

    pub fn is_registered(&self) -> bool {
        self.state() == State::Registered
    }

    /// Number of completed Register/Unregister cycles
    pub fn epoch(&self) -> u64 {
        self.lock().epoch.number
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Hotkey {
    fn drop(&mut self) {
        let state = self.state();
        debug_assert!(state.is_at_rest(), "hotkey dropped mid-transition: {state}");
        if state != State::Registered {
            return;
        }

        debug!(?self.modifiers, key = self.key.code(), "unregistering hotkey on drop");
        if let Err(err) = self.unregister() {
            // Without the backend's confirmation the handle may still be
            // fired, so it stays allocated.
            warn!(error = %err, "failed to unregister hotkey on drop");
        }
    }
}

impl std::fmt::Debug for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Hotkey")
            .field("modifiers", &self.modifiers)
            .field("key", &self.key)
            .field("state", &inner.state)
            .field("epoch", &inner.epoch.number)
            .finish()
    }
}
