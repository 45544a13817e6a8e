//! Observable value cell
//!
//! A [`ValueCell<T>`] holds a current value and emits it through two
//! multi-fire signals around every assignment: `will_change` fires with the
//! incoming value before the store, `did_change` with the new value after.
//! The construction value is never emitted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::promise::Promise;

struct CellInner<T> {
    value: Mutex<T>,
    will_change: Promise<T>,
    did_change: Promise<T>,
}

/// Mutable value box with before/after-change signals. Clones share state.
pub struct ValueCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ValueCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: Mutex::new(initial),
                will_change: Promise::multi(),
                did_change: Promise::multi(),
            }),
        }
    }

    fn guard(&self) -> MutexGuard<'_, T> {
        self.inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.guard().clone()
    }

    /// Assign a new value, emitting `will_change` before the store and
    /// `did_change` after it.
    pub fn set(&self, value: T) {
        self.inner.will_change.emit(value.clone());
        *self.guard() = value.clone();
        self.inner.did_change.emit(value);
    }

    /// Signal firing with the incoming value before each assignment.
    pub fn will_change(&self) -> &Promise<T> {
        &self.inner.will_change
    }

    /// Signal firing with the new value after each assignment.
    pub fn did_change(&self) -> &Promise<T> {
        &self.inner.did_change
    }
}
