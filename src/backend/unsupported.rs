//! Backend for platforms without a native hotkey implementation

use crate::dispatch::Dispatcher;
use crate::handle::Handle;
use crate::hotkey::{Key, Modifiers};

use super::{Backend, BackendError, NativeRef};

/// Placeholder backend that fails its startup probe
#[derive(Debug, Default)]
pub struct UnsupportedBackend {
    _private: (),
}

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn reason() -> String {
        format!(
            "global hotkeys are not available on {}",
            std::env::consts::OS
        )
    }
}

impl Backend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn probe(&self) -> Result<(), BackendError> {
        Err(BackendError::Unavailable(Self::reason()))
    }

    fn register(
        &self,
        _modifiers: Modifiers,
        _key: Key,
        _handle: Handle,
        _dispatcher: Dispatcher,
    ) -> Result<NativeRef, BackendError> {
        Err(BackendError::Unavailable(Self::reason()))
    }

    fn unregister(&self, _native: NativeRef) -> Result<(), BackendError> {
        Err(BackendError::NotActive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_unavailable() {
        let backend = UnsupportedBackend::new();
        let result = backend.register(
            Modifiers::CONTROL,
            Key::from_code(1),
            Handle::from_raw(1),
            Dispatcher::new(),
        );
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert_eq!(
            backend.unregister(NativeRef::from_raw(1)),
            Err(BackendError::NotActive)
        );
    }
}
