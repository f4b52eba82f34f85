//! In-process backend
//!
//! Behaves like an OS hotkey service without touching the OS: a
//! combination can be owned by one registrant at a time, and simulated key
//! presses are delivered on whichever thread calls [`MemoryBackend::press`]
//! or [`MemoryBackend::release`]. Used by the test suite and by the daemon
//! when no native backend is wanted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::events::SignalKind;
use crate::handle::Handle;
use crate::hotkey::{Key, Modifiers};

use super::{Backend, BackendError, NativeRef};

struct Grab {
    modifiers: Modifiers,
    key: Key,
    handle: Handle,
    dispatcher: Dispatcher,
}

#[derive(Default)]
struct MemoryState {
    grabs: HashMap<NativeRef, Grab>,
    rejected: HashSet<(Modifiers, Key)>,
    last_caller: Option<ThreadId>,
}

/// Simulated hotkey service
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    next: AtomicU64,
    fail_unregister: AtomicBool,
    latency: Duration,
    main_thread_affinity: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every `register` call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Demand that registration runs on the main thread
    pub fn with_main_thread_affinity(mut self) -> Self {
        self.main_thread_affinity = true;
        self
    }

    /// Make the system refuse `modifiers` + `key` from now on
    pub fn reject(&self, modifiers: Modifiers, key: Key) {
        self.lock().rejected.insert((modifiers, key));
    }

    /// Make every `unregister` fail while set, keeping the grab in place
    pub fn fail_unregister(&self, fail: bool) {
        self.fail_unregister.store(fail, Ordering::SeqCst);
    }

    /// Simulate the combination going down; returns how many registrations fired
    pub fn press(&self, modifiers: Modifiers, key: Key) -> usize {
        self.fire(modifiers, key, SignalKind::KeyDown)
    }

    /// Simulate the combination going up; returns how many registrations fired
    pub fn release(&self, modifiers: Modifiers, key: Key) -> usize {
        self.fire(modifiers, key, SignalKind::KeyUp)
    }

    /// Press and release once
    pub fn tap(&self, modifiers: Modifiers, key: Key) -> usize {
        let fired = self.press(modifiers, key);
        self.release(modifiers, key);
        fired
    }

    /// Number of live registrations
    pub fn active(&self) -> usize {
        self.lock().grabs.len()
    }

    /// Thread that performed the most recent register or unregister
    pub fn last_caller(&self) -> Option<ThreadId> {
        self.lock().last_caller
    }

    // Callbacks go out while the state lock is held, the way an OS input
    // thread holds its own locks. `unregister` takes the same lock, so once
    // it returns no callback for that registration is still running.
    fn fire(&self, modifiers: Modifiers, key: Key, signal: SignalKind) -> usize {
        let state = self.lock();
        let mut fired = 0;
        for grab in state.grabs.values() {
            if grab.modifiers == modifiers && grab.key == key {
                grab.dispatcher.dispatch(grab.handle, signal);
                fired += 1;
            }
        }
        fired
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn requires_main_thread(&self) -> bool {
        self.main_thread_affinity
    }

    fn register(
        &self,
        modifiers: Modifiers,
        key: Key,
        handle: Handle,
        dispatcher: Dispatcher,
    ) -> Result<NativeRef, BackendError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut state = self.lock();
        state.last_caller = Some(thread::current().id());

        if state.rejected.contains(&(modifiers, key)) {
            return Err(BackendError::Rejected(format!(
                "combination {:?}+{:#x} is reserved",
                modifiers,
                key.code()
            )));
        }
        if state
            .grabs
            .values()
            .any(|g| g.modifiers == modifiers && g.key == key)
        {
            return Err(BackendError::Conflict);
        }

        let native = NativeRef::from_raw(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        state.grabs.insert(
            native,
            Grab {
                modifiers,
                key,
                handle,
                dispatcher,
            },
        );

        info!(?native, %handle, ?modifiers, key = key.code(), "memory hotkey grabbed");
        Ok(native)
    }

    fn unregister(&self, native: NativeRef) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.last_caller = Some(thread::current().id());

        if self.fail_unregister.load(Ordering::SeqCst) && state.grabs.contains_key(&native) {
            warn!(?native, "memory hotkey release refused");
            return Err(BackendError::Rejected("release refused".into()));
        }

        match state.grabs.remove(&native) {
            Some(grab) => {
                debug!(?native, handle = %grab.handle, "memory hotkey released");
                Ok(())
            }
            None => Err(BackendError::NotActive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dispatch::EpochSinks;
    use crate::relay::relay;

    const KEY: Key = Key::from_code(0x20);

    fn published(dispatcher: &Dispatcher) -> (Handle, crate::relay::EventStream) {
        let (keydown, down) = relay(0);
        let (keyup, _up) = relay(0);
        (dispatcher.publish(EpochSinks { keydown, keyup }), down)
    }

    #[test]
    fn test_conflicting_registration() {
        let backend = MemoryBackend::new();
        let dispatcher = Dispatcher::new();
        let (h1, _) = published(&dispatcher);
        let (h2, _) = published(&dispatcher);

        let first = backend.register(Modifiers::CONTROL, KEY, h1, dispatcher.clone());
        assert!(first.is_ok());

        let second = backend.register(Modifiers::CONTROL, KEY, h2, dispatcher.clone());
        assert_eq!(second, Err(BackendError::Conflict));

        // A different modifier set is a different combination.
        let third = backend.register(Modifiers::ALT, KEY, h2, dispatcher);
        assert!(third.is_ok());
        assert_eq!(backend.active(), 2);
    }

    #[test]
    fn test_rejected_combination() {
        let backend = MemoryBackend::new();
        backend.reject(Modifiers::SUPER, KEY);

        let result = backend.register(
            Modifiers::SUPER,
            KEY,
            Handle::from_raw(1),
            Dispatcher::new(),
        );
        assert!(matches!(result, Err(BackendError::Rejected(_))));
    }

    #[test]
    fn test_press_reaches_matching_grab_only() {
        let backend = MemoryBackend::new();
        let dispatcher = Dispatcher::new();
        let (handle, down) = published(&dispatcher);
        let native = backend
            .register(Modifiers::CONTROL, KEY, handle, dispatcher.clone())
            .unwrap();

        assert_eq!(backend.press(Modifiers::CONTROL, KEY), 1);
        assert_eq!(backend.press(Modifiers::SHIFT, KEY), 0);

        backend.unregister(native).unwrap();
        assert_eq!(backend.press(Modifiers::CONTROL, KEY), 0);

        dispatcher.retire(handle);
        assert_eq!(down.count(), 1);
    }

    #[test]
    fn test_refused_release_keeps_grab() {
        let backend = MemoryBackend::new();
        let dispatcher = Dispatcher::new();
        let (handle, down) = published(&dispatcher);
        let native = backend
            .register(Modifiers::CONTROL, KEY, handle, dispatcher.clone())
            .unwrap();

        backend.fail_unregister(true);
        assert!(matches!(
            backend.unregister(native),
            Err(BackendError::Rejected(_))
        ));
        assert_eq!(backend.active(), 1);
        assert_eq!(backend.press(Modifiers::CONTROL, KEY), 1);

        backend.fail_unregister(false);
        assert_eq!(backend.unregister(native), Ok(()));
        assert_eq!(backend.active(), 0);

        dispatcher.retire(handle);
        assert_eq!(down.count(), 1);
    }

    #[test]
    fn test_unregister_unknown_reference() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.unregister(NativeRef::from_raw(5)),
            Err(BackendError::NotActive)
        );
    }
}
