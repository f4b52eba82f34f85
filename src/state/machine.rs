//! Registration state transitions
//!
//! The transient states exist so the guard can be checked and claimed under
//! a short critical section while the slow backend call runs unlocked. A
//! second caller arriving mid-transition sees a transient state and is
//! refused instead of acting on a half-finished registration.

use crate::error::{Error, Result};

/// The four registration states of a hotkey
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// No native grab; the only state `register` accepts
    #[default]
    Unregistered,
    /// Backend registration in progress
    Registering,
    /// Native grab is live; the only state `unregister` accepts
    Registered,
    /// Backend release in progress
    Unregistering,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Unregistered => write!(f, "Unregistered"),
            State::Registering => write!(f, "Registering"),
            State::Registered => write!(f, "Registered"),
            State::Unregistering => write!(f, "Unregistering"),
        }
    }
}

impl State {
    /// Claim the registration guard
    pub fn begin_register(&mut self) -> Result<()> {
        match self {
            State::Unregistered => {
                *self = State::Registering;
                Ok(())
            }
            _ => Err(Error::AlreadyRegistered),
        }
    }

    /// Settle a registration attempt
    pub fn finish_register(&mut self, succeeded: bool) {
        debug_assert_eq!(*self, State::Registering);
        *self = if succeeded {
            State::Registered
        } else {
            State::Unregistered
        };
    }

    /// Claim the unregistration guard
    pub fn begin_unregister(&mut self) -> Result<()> {
        match self {
            State::Registered => {
                *self = State::Unregistering;
                Ok(())
            }
            _ => Err(Error::NotRegistered),
        }
    }

    /// Settle an unregistration attempt
    pub fn finish_unregister(&mut self, succeeded: bool) {
        debug_assert_eq!(*self, State::Unregistering);
        *self = if succeeded {
            State::Unregistered
        } else {
            State::Registered
        };
    }

    /// Whether no transition is in progress
    pub fn is_at_rest(self) -> bool {
        matches!(self, State::Unregistered | State::Registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = State::default();
        assert_eq!(state, State::Unregistered);
        assert!(state.is_at_rest());
    }

    #[test]
    fn test_full_cycle() {
        let mut state = State::default();

        state.begin_register().unwrap();
        assert_eq!(state, State::Registering);
        assert!(!state.is_at_rest());
        state.finish_register(true);
        assert_eq!(state, State::Registered);

        state.begin_unregister().unwrap();
        assert_eq!(state, State::Unregistering);
        state.finish_unregister(true);
        assert_eq!(state, State::Unregistered);
    }

    #[test]
    fn test_failed_register_rolls_back() {
        let mut state = State::default();
        state.begin_register().unwrap();
        state.finish_register(false);
        assert_eq!(state, State::Unregistered);
    }

    #[test]
    fn test_failed_unregister_stays_registered() {
        let mut state = State::Registered;
        state.begin_unregister().unwrap();
        state.finish_unregister(false);
        assert_eq!(state, State::Registered);
    }

    #[test]
    fn test_register_guard() {
        for mut state in [State::Registering, State::Registered, State::Unregistering] {
            assert_eq!(state.begin_register(), Err(Error::AlreadyRegistered));
        }
    }

    #[test]
    fn test_unregister_guard() {
        for mut state in [State::Unregistered, State::Registering, State::Unregistering] {
            assert_eq!(state.begin_unregister(), Err(Error::NotRegistered));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(State::Registering.to_string(), "Registering");
    }
}
