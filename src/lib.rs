//! globalkey: system-wide hotkeys without owning the OS event loop
//!
//! The crate provides:
//! - A main-thread scheduler for platforms that only accept registration
//!   from the thread running the event pump
//! - Lossless relays turning native callbacks into pull-style event streams
//! - A per-hotkey registration state machine that is safe under concurrent
//!   register/unregister calls
//! - A handle table so native code refers to Rust values by integer only
//!
//! ```no_run
//! use globalkey::{backend, mainthread, Key, Modifiers, Registry};
//!
//! mainthread::run(|scheduler| -> globalkey::Result<()> {
//!     let registry = Registry::with_scheduler(backend::native(), scheduler)?;
//!     let hotkey = registry.hotkey(Modifiers::CONTROL | Modifiers::SHIFT, Key::from_code(1));
//!     hotkey.register()?;
//!
//!     for _event in hotkey.keydown().take(3) {
//!         println!("pressed");
//!     }
//!     hotkey.unregister()
//! })
//! .unwrap();
//! ```

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handle;
pub mod hotkey;
pub mod mainthread;
pub mod registry;
pub mod relay;
pub mod state;

pub use backend::{Backend, BackendError, MemoryBackend, NativeRef};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use events::{Event, SignalKind};
pub use handle::{Handle, HandleTable};
pub use hotkey::{Hotkey, Key, Modifier, Modifiers};
pub use mainthread::Scheduler;
pub use registry::Registry;
pub use relay::EventStream;
pub use state::State;
