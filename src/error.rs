//! Error types for hotkey registration and main-thread scheduling

use crate::backend::BackendError;
use crate::handle::Handle;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the registry, controllers and scheduler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("hotkey is already registered")]
    AlreadyRegistered,

    #[error("hotkey is not registered")]
    NotRegistered,

    #[error("native registration failed: {0}")]
    NativeRegistrationFailed(String),

    #[error("native unregistration failed: {0}")]
    NativeUnregistrationFailed(String),

    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// Never returned; used as the panic message for invalid handle access
    #[error("misuse of an invalid handle {0}")]
    HandleMisuse(Handle),

    #[error("main thread task panicked: {0}")]
    SchedulerFault(String),

    #[error("main thread scheduler is not running")]
    SchedulerStopped,
}

impl Error {
    /// Map a backend failure during `register`
    pub(crate) fn from_register(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Error::UnsupportedEnvironment(reason),
            other => Error::NativeRegistrationFailed(other.to_string()),
        }
    }

    /// Map a backend failure during `unregister`
    pub(crate) fn from_unregister(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(reason) => Error::UnsupportedEnvironment(reason),
            other => Error::NativeUnregistrationFailed(other.to_string()),
        }
    }
}
