//! Handle table for values referenced across the native callback boundary
//!
//! Native code never sees a pointer into Rust memory. It is given an
//! integer [`Handle`] and passes it back when it fires a callback; the
//! table resolves the integer to the owned value.
//!
//! Handles are allocated from a monotonically increasing counter starting
//! at 1, so zero is never valid and can be used as a sentinel in C APIs.
//! Looking up or freeing a handle that is not live is a contract violation
//! and panics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Opaque integer token standing in for a value owned by a [`HandleTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Rebuild a handle from the raw integer a native callback passed back
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw integer to hand to native code
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Concurrency-safe arena mapping handles to owned values
///
/// Lookups take a shared lock; allocation and freeing take it exclusively.
pub struct HandleTable<T> {
    next: AtomicU64,
    slots: RwLock<HashMap<Handle, T>>,
}

impl<T> HandleTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Store `value` and return the handle that now refers to it
    pub fn insert(&self, value: T) -> Handle {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        if raw == 0 {
            panic!("handle table ran out of handle space");
        }

        let handle = Handle(raw);
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, value);
        handle
    }

    /// Invalidate `handle` and give back the value it referred to
    ///
    /// # Panics
    ///
    /// Panics if `handle` was never allocated or is already freed.
    pub fn remove(&self, handle: Handle) -> T {
        let removed = self
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);

        match removed {
            Some(value) => value,
            None => panic!("{}", Error::HandleMisuse(handle)),
        }
    }

    /// Whether `handle` currently refers to a value
    pub fn contains(&self, handle: Handle) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> HandleTable<T> {
    /// Resolve `handle` to a clone of its value
    ///
    /// The lock is released before returning, so callers may use the value
    /// without holding up concurrent allocation or freeing.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was never allocated or is already freed.
    pub fn get(&self, handle: Handle) -> T {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.get(&handle) {
            Some(value) => value.clone(),
            None => panic!("{}", Error::HandleMisuse(handle)),
        }
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
