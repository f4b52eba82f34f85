//! macOS backend built on CGEventTap
//!
//! Every registration gets a dedicated thread with its own CFRunLoop and a
//! listen-only event tap filtered to key events. The run loop is polled in
//! short slices so `unregister` is observed without waiting for another key
//! event; it joins the thread, so no callback is in flight once it returns.
//!
//! Requires the Accessibility permission. The tap only listens: the key
//! event still reaches the focused application. Duplicate combinations are
//! refused within this backend; other processes' shortcuts are not visible.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::events::SignalKind;
use crate::handle::Handle;
use crate::hotkey::{Key, Modifiers};

use super::{Backend, BackendError, NativeRef};

/// Run loop slice between checks of the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Modifier flag masks considered when matching a combination
const RELEVANT_FLAGS: [(Modifiers, CGEventFlags); 4] = [
    (Modifiers::SHIFT, CGEventFlags::CGEventFlagShift),
    (Modifiers::CONTROL, CGEventFlags::CGEventFlagControl),
    (Modifiers::ALT, CGEventFlags::CGEventFlagAlternate),
    (Modifiers::SUPER, CGEventFlags::CGEventFlagCommand),
];

fn modifiers_from_flags(flags: CGEventFlags) -> Modifiers {
    RELEVANT_FLAGS
        .iter()
        .filter(|(_, flag)| flags.contains(*flag))
        .fold(Modifiers::NONE, |set, (m, _)| set | *m)
}

fn tap_disabled(event_type: CGEventType) -> bool {
    matches!(
        event_type,
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
    )
}

struct TapThread {
    modifiers: Modifiers,
    key: Key,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Event tap backend, one listener thread per registration
#[derive(Default)]
pub struct EventTapBackend {
    taps: Mutex<HashMap<NativeRef, TapThread>>,
    next: AtomicU64,
}

impl EventTapBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn taps(&self) -> MutexGuard<'_, HashMap<NativeRef, TapThread>> {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for EventTapBackend {
    fn name(&self) -> &'static str {
        "event-tap"
    }

    fn register(
        &self,
        modifiers: Modifiers,
        key: Key,
        handle: Handle,
        dispatcher: Dispatcher,
    ) -> Result<NativeRef, BackendError> {
        // Held through setup so two registrations of one combination
        // cannot both pass the check. The tap thread never takes it.
        let mut taps = self.taps();
        if taps
            .values()
            .any(|tap| tap.modifiers == modifiers && tap.key == key)
        {
            return Err(BackendError::Conflict);
        }

        let native = NativeRef::from_raw(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name(format!("globalkey-tap-{}", native.as_raw()))
            .spawn({
                let running = Arc::clone(&running);
                move || {
                    run_tap(modifiers, key, handle, dispatcher, running, ready_tx);
                }
            })
            .map_err(|e| BackendError::Rejected(format!("failed to spawn tap thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(?native, %handle, ?modifiers, key = key.code(), "event tap installed");
                taps.insert(
                    native,
                    TapThread {
                        modifiers,
                        key,
                        running,
                        thread,
                    },
                );
                Ok(native)
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(BackendError::Rejected("tap thread exited during setup".into()))
            }
        }
    }

    fn unregister(&self, native: NativeRef) -> Result<(), BackendError> {
        let tap = self.taps().remove(&native).ok_or(BackendError::NotActive)?;

        tap.running.store(false, Ordering::SeqCst);
        if tap.thread.join().is_err() {
            warn!(?native, "event tap thread panicked");
        }

        debug!(?native, "event tap removed");
        Ok(())
    }
}

/// Install the tap on the current thread and pump its run loop
fn run_tap(
    modifiers: Modifiers,
    key: Key,
    handle: Handle,
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    ready: mpsc::SyncSender<Result<(), BackendError>>,
) {
    let pressed = Cell::new(false);

    // Runs on this thread inside the run loop; must stay fast.
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        // Carries no key code, so it must be checked before the key filter.
        if tap_disabled(event_type) {
            warn!(%handle, "event tap disabled by the system");
            return Some(event.clone());
        }

        let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
        if code != i64::from(key.code()) {
            return Some(event.clone());
        }

        match event_type {
            CGEventType::KeyDown => {
                let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT);
                if repeat == 0 && modifiers_from_flags(event.get_flags()) == modifiers {
                    pressed.set(true);
                    dispatcher.dispatch(handle, SignalKind::KeyDown);
                }
            }
            CGEventType::KeyUp => {
                // Modifiers may already be up by now; the key alone decides.
                if pressed.replace(false) {
                    dispatcher.dispatch(handle, SignalKind::KeyUp);
                }
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown, CGEventType::KeyUp],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready.send(Err(BackendError::Rejected(
                "failed to create event tap - check Accessibility permissions".into(),
            )));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready.send(Err(BackendError::Rejected(
                "failed to create run loop source".into(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    let _ = ready.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, POLL_INTERVAL, true);
        }
    }

    debug!(%handle, "event tap thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_from_flags() {
        let flags = CGEventFlags::CGEventFlagControl | CGEventFlags::CGEventFlagCommand;
        assert_eq!(
            modifiers_from_flags(flags),
            Modifiers::CONTROL | Modifiers::SUPER
        );
    }

    #[test]
    fn test_no_flags() {
        assert!(modifiers_from_flags(CGEventFlags::CGEventFlagNull).is_empty());
    }

    #[test]
    fn test_tap_disabled_notices() {
        assert!(tap_disabled(CGEventType::TapDisabledByTimeout));
        assert!(tap_disabled(CGEventType::TapDisabledByUserInput));
        assert!(!tap_disabled(CGEventType::KeyDown));
        assert!(!tap_disabled(CGEventType::KeyUp));
    }

    #[test]
    fn test_duplicate_combination_conflicts() {
        let backend = EventTapBackend::new();
        let key = Key::from_code(1);
        let running = Arc::new(AtomicBool::new(false));
        backend.taps().insert(
            NativeRef::from_raw(1),
            TapThread {
                modifiers: Modifiers::CONTROL,
                key,
                running,
                thread: thread::spawn(|| ()),
            },
        );

        // Refused before any tap thread is started.
        let result = backend.register(
            Modifiers::CONTROL,
            key,
            Handle::from_raw(2),
            Dispatcher::new(),
        );
        assert_eq!(result, Err(BackendError::Conflict));
        assert_eq!(backend.taps().len(), 1);

        assert_eq!(backend.unregister(NativeRef::from_raw(1)), Ok(()));
        assert!(backend.taps().is_empty());
    }

    #[test]
    fn test_unregister_unknown_tap() {
        let backend = EventTapBackend::new();
        assert_eq!(
            backend.unregister(NativeRef::from_raw(3)),
            Err(BackendError::NotActive)
        );
    }
}
