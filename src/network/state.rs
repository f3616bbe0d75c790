//! Memoized state with explicit invalidation.
//!
//! A `StateCoordinator` caches the result of an update function until it is
//! marked dirty. Ports use it for readiness.

use std::cell::Cell;

/// Cached value plus a dirty flag.
///
/// `get` recomputes only when dirty and then clears the flag. Recomputing
/// works through a shared borrow.
#[derive(Debug)]
pub struct StateCoordinator<T: Copy> {
    value: Cell<T>,
    dirty: Cell<bool>,
}

impl<T: Copy + PartialEq> StateCoordinator<T> {
    /// Create a coordinator that must be computed before first use.
    pub fn new(initial: T) -> Self {
        Self {
            value: Cell::new(initial),
            dirty: Cell::new(true),
        }
    }

    /// Return the cached value, recomputing it with `update` if dirty.
    pub fn get(&self, update: impl FnOnce() -> T) -> T {
        if self.dirty.get() {
            self.value.set(update());
            self.dirty.set(false);
        }
        self.value.get()
    }

    /// Recompute immediately. Returns `true` when the value changed.
    pub fn update(&self, update: impl FnOnce() -> T) -> bool {
        let new_value = update();
        let changed = new_value != self.value.get();
        self.value.set(new_value);
        self.dirty.set(false);
        changed
    }

    /// Mark the cached value stale.
    pub fn invalidate(&self) {
        self.dirty.set(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Last computed value, without recomputing.
    pub fn peek(&self) -> T {
        self.value.get()
    }
}
