//! Fan-in over heterogeneous promises
//!
//! [`AllDone`] accumulates statically-typed promises and produces a single
//! readiness promise: fulfilled once every member has fulfilled, failed with
//! the first member error seen. Members that are still running when one
//! fails continue to completion; their own handlers fire normally, but the
//! combined promise no longer waits on them.
//!
//! ```rust,ignore
//! let ready = AllDone::new()
//!     .wait_on(&account)
//!     .wait_on(&timeline)
//!     .ready();
//! ready.then(move |_| {
//!     // account.value() and timeline.value() are both present here
//! });
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::promise::Promise;

struct Gate {
    remaining: usize,
    sealed: bool,
    fired: bool,
}

struct AllState {
    gate: Mutex<Gate>,
    done: Promise<()>,
}

impl AllState {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder accumulating typed promises into one readiness promise.
pub struct AllDone {
    state: Arc<AllState>,
}

impl Default for AllDone {
    fn default() -> Self {
        Self::new()
    }
}

impl AllDone {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AllState {
                gate: Mutex::new(Gate {
                    remaining: 0,
                    sealed: false,
                    fired: false,
                }),
                done: Promise::new(),
            }),
        }
    }

    /// Add a member promise. Must be called before [`AllDone::ready`];
    /// members added afterwards are ignored.
    pub fn wait_on<T: Clone + Send + Sync + 'static>(self, member: &Promise<T>) -> Self {
        {
            let mut gate = self.state.gate();
            if gate.sealed {
                drop(gate);
                return self;
            }
            gate.remaining += 1;
        }

        let state = Arc::clone(&self.state);
        member.then(move |_| {
            let fire = {
                let mut gate = state.gate();
                gate.remaining = gate.remaining.saturating_sub(1);
                let fire = gate.sealed && gate.remaining == 0 && !gate.fired;
                if fire {
                    gate.fired = true;
                }
                fire
            };
            if fire && !state.done.is_failed() {
                state.done.forward(());
            }
        });

        let state = Arc::clone(&self.state);
        member.fail(move |err| {
            state.done.throw_shared(Arc::clone(err));
        });

        self
    }

    /// Seal the member set and return the combined promise. With no members
    /// it fulfills immediately.
    pub fn ready(self) -> Promise<()> {
        let fire = {
            let mut gate = self.state.gate();
            gate.sealed = true;
            let fire = gate.remaining == 0 && !gate.fired;
            if fire {
                gate.fired = true;
            }
            fire
        };
        if fire && !self.state.done.is_failed() {
            self.state.done.forward(());
        }
        self.state.done.clone()
    }
}

/// Fan-in over a homogeneous slice of promises.
pub fn all_done<T: Clone + Send + Sync + 'static>(promises: &[Promise<T>]) -> Promise<()> {
    promises
        .iter()
        .fold(AllDone::new(), |all, promise| all.wait_on(promise))
        .ready()
}
