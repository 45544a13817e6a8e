//! The `Promise<T>` primitive
//!
//! A `Promise<T>` is a cheaply cloneable handle to a shared completion state.
//! Constructed with [`Promise::new`] it behaves as a one-shot future; with
//! [`Promise::multi`] it behaves as an event signal that may fulfill
//! repeatedly and replays its latest value to late subscribers.
//!
//! Fulfilling a one-shot promise twice is a programming-contract violation.
//! It is reported as a typed [`ContractViolation`] error rather than a panic,
//! so a misbehaving producer cannot take the process down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tracing::{debug, error, warn};

use super::queue::MainQueue;
use super::BoxError;

/// Error payload carried by a failed promise, shared across handlers.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Violation of the one-shot completion contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// `fulfill` was called on an already-fulfilled one-shot promise.
    #[error("promise already fulfilled")]
    AlreadyFulfilled,

    /// `fulfill` was called on a promise that has already failed.
    #[error("promise already failed")]
    AlreadyFailed,
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(SharedError),
}

type ThenHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;
type FailHandler = Arc<dyn Fn(&SharedError) + Send + Sync>;

struct Registration<H> {
    id: u64,
    handler: H,
}

struct Inner<T> {
    state: State<T>,
    multi: bool,
    then_handlers: Vec<Registration<ThenHandler<T>>>,
    fail_handlers: Vec<Registration<FailHandler>>,
    next_id: u64,
}

/// One-shot future or multi-fire signal, selected at construction.
pub struct Promise<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    /// Create a pending one-shot promise.
    pub fn new() -> Self {
        Self::with_flag(false)
    }

    /// Create a pending multi-fire signal.
    pub fn multi() -> Self {
        Self::with_flag(true)
    }

    /// Create an already-fulfilled one-shot promise.
    pub fn fulfilled(value: T) -> Self {
        let promise = Self::new();
        let _ = promise.fulfill(value);
        promise
    }

    /// Create a one-shot promise driven by `setup`.
    ///
    /// `setup` receives the promise itself and may fulfill it synchronously
    /// or hand it off for later completion. Returning an error from `setup`
    /// puts the promise into the failed state immediately.
    ///
    /// ```rust,ignore
    /// let answer = Promise::with(|p| {
    ///     p.fulfill(42)?;
    ///     Ok(())
    /// });
    /// ```
    pub fn with<F>(setup: F) -> Self
    where
        F: FnOnce(&Promise<T>) -> Result<(), BoxError>,
    {
        let promise = Self::new();
        if let Err(err) = setup(&promise) {
            promise.throw_shared(err.into());
        }
        promise
    }

    fn with_flag(multi: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                multi,
                then_handlers: Vec::new(),
                fail_handlers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether this promise was created as a multi-fire signal.
    pub fn is_multi(&self) -> bool {
        self.lock().multi
    }

    /// The stored value, if fulfilled.
    pub fn value(&self) -> Option<T> {
        match &self.lock().state {
            State::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The stored error, if failed.
    pub fn error(&self) -> Option<SharedError> {
        match &self.lock().state {
            State::Failed(err) => Some(Arc::clone(err)),
            _ => None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.lock().state, State::Fulfilled(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.lock().state, State::Failed(_))
    }

    /// Complete the promise with `value`.
    ///
    /// One-shot promises accept exactly one fulfillment; a second attempt, or
    /// an attempt after failure, returns a [`ContractViolation`]. Multi-fire
    /// signals store `value` as their latest value and keep all handlers
    /// registered for future fulfillments.
    pub fn fulfill(&self, value: T) -> Result<(), ContractViolation> {
        let (handlers, snapshot) = {
            let mut inner = self.lock();
            match inner.state {
                State::Fulfilled(_) if !inner.multi => {
                    return Err(ContractViolation::AlreadyFulfilled)
                }
                State::Failed(_) => return Err(ContractViolation::AlreadyFailed),
                _ => {}
            }

            let snapshot = value.clone();
            inner.state = State::Fulfilled(value);

            let handlers: Vec<ThenHandler<T>> = if inner.multi {
                inner
                    .then_handlers
                    .iter()
                    .map(|reg| Arc::clone(&reg.handler))
                    .collect()
            } else {
                std::mem::take(&mut inner.then_handlers)
                    .into_iter()
                    .map(|reg| reg.handler)
                    .collect()
            };
            (handlers, snapshot)
        };

        for handler in handlers {
            handler(&snapshot);
        }
        Ok(())
    }

    /// Multi-fire convenience: fulfill and log (rather than return) a
    /// contract violation. Intended for signal publishers that have no
    /// meaningful way to react to one.
    pub fn emit(&self, value: T) {
        if let Err(violation) = self.fulfill(value) {
            error!(%violation, "dropped signal emission");
        }
    }

    /// Fail the promise. Failure is terminal: fail handlers fire once with
    /// the error and later fulfillments are rejected.
    pub fn throw<E>(&self, err: E)
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.throw_shared(Arc::new(err));
    }

    pub(crate) fn throw_shared(&self, err: SharedError) {
        let handlers = {
            let mut inner = self.lock();
            match inner.state {
                State::Failed(_) => {
                    debug!(error = %err, "promise already failed, ignoring");
                    return;
                }
                State::Fulfilled(_) if !inner.multi => {
                    warn!(error = %err, "ignoring failure of fulfilled promise");
                    return;
                }
                _ => {}
            }
            inner.state = State::Failed(Arc::clone(&err));
            inner.then_handlers.clear();
            std::mem::take(&mut inner.fail_handlers)
        };

        for reg in handlers {
            (reg.handler)(&err);
        }
    }

    /// Register a success handler.
    ///
    /// If a value is already stored the handler is invoked immediately with
    /// it; on a multi-fire signal it additionally stays registered and fires
    /// again on every later fulfillment. Returns `&self` for chaining.
    pub fn then<F>(&self, handler: F) -> &Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register_then(Arc::new(handler));
        self
    }

    /// Register a failure handler, replaying an already-stored error.
    pub fn fail<F>(&self, handler: F) -> &Self
    where
        F: Fn(&SharedError) + Send + Sync + 'static,
    {
        self.register_fail(Arc::new(handler));
        self
    }

    /// Register a success handler and return an unsubscribe handle.
    ///
    /// Dropping (or cancelling) the [`Subscription`] unregisters the handler.
    /// Replay semantics are identical to [`Promise::then`].
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.register_then(Arc::new(handler));
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = Weak::upgrade(&weak) {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.then_handlers.retain(|reg| reg.id != id);
            }
        })
    }

    fn register_then(&self, handler: ThenHandler<T>) -> u64 {
        let (id, replay) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            match &inner.state {
                State::Pending => {
                    inner.then_handlers.push(Registration { id, handler });
                    (id, None)
                }
                State::Fulfilled(value) => {
                    let value = value.clone();
                    if inner.multi {
                        inner.then_handlers.push(Registration {
                            id,
                            handler: Arc::clone(&handler),
                        });
                        (id, Some((handler, value)))
                    } else {
                        (id, Some((handler, value)))
                    }
                }
                State::Failed(_) => (id, None),
            }
        };

        if let Some((handler, value)) = replay {
            handler(&value);
        }
        id
    }

    fn register_fail(&self, handler: FailHandler) -> u64 {
        let (id, replay) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            match &inner.state {
                State::Failed(err) => (id, Some((handler, Arc::clone(err)))),
                _ => {
                    inner.fail_handlers.push(Registration { id, handler });
                    (id, None)
                }
            }
        };

        if let Some((handler, err)) = replay {
            handler(&err);
        }
        id
    }

    /// Derive a promise that fulfills with `transform(value)`.
    ///
    /// The derived promise carries the same one-shot/multi-fire flag as the
    /// source, and inherits the source's failure.
    pub fn map<U, F>(&self, transform: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let mapped = Promise::with_flag(self.is_multi());

        let target = mapped.clone();
        self.then(move |value| target.forward(transform(value)));
        let target = mapped.clone();
        self.fail(move |err| target.throw_shared(Arc::clone(err)));

        mapped
    }

    /// Flatten a two-stage dependency: once this promise fulfills,
    /// `continuation` produces an inner promise whose outcome settles the
    /// returned promise. The inner promise is created lazily, only when the
    /// source value exists.
    pub fn combine<U, F>(&self, continuation: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Promise<U> + Send + Sync + 'static,
    {
        let combined = Promise::new();

        let target = combined.clone();
        self.then(move |value| {
            let inner = continuation(value);
            let fulfill_target = target.clone();
            inner.then(move |value| fulfill_target.forward(value.clone()));
            let fail_target = target.clone();
            inner.fail(move |err| fail_target.throw_shared(Arc::clone(err)));
        });
        let target = combined.clone();
        self.fail(move |err| target.throw_shared(Arc::clone(err)));

        combined
    }

    /// Re-deliver this promise's outcomes on `queue`, preserving order.
    ///
    /// Every handler registered on the returned promise runs on the queue's
    /// consumer, serializing it with everything else dispatched there.
    pub fn via(&self, queue: &MainQueue) -> Promise<T> {
        let routed = Promise::with_flag(self.is_multi());

        let target = routed.clone();
        let dispatch = queue.clone();
        self.then(move |value| {
            let value = value.clone();
            let target = target.clone();
            dispatch.dispatch(move || target.forward(value));
        });
        let target = routed.clone();
        let dispatch = queue.clone();
        self.fail(move |err| {
            let err = Arc::clone(err);
            let target = target.clone();
            dispatch.dispatch(move || target.throw_shared(err));
        });

        routed
    }

    // Internal completion path for derived promises, where a violation means
    // a bug in this module rather than in the caller.
    pub(crate) fn forward(&self, value: T) {
        if let Err(violation) = self.fulfill(value) {
            debug!(%violation, "derived promise dropped a propagated value");
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let state = match inner.state {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Failed(_) => "failed",
        };
        f.debug_struct("Promise")
            .field("multi", &inner.multi)
            .field("state", &state)
            .finish()
    }
}

/// Handle to a registered handler; cancelling (or dropping) it unregisters
/// the handler from its promise.
pub struct Subscription {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Unregister the handler now.
    pub fn cancel(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("{message}")]
    struct SomeError {
        message: &'static str,
    }

    #[test]
    fn setup_and_then_run_synchronously() {
        let then_calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&then_calls);
        let promise = Promise::with(|p| {
            p.fulfill("hello")?;
            Ok(())
        });
        promise.then(move |value| {
            assert_eq!(*value, "hello");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(promise.is_fulfilled());
        assert_eq!(then_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_fulfillment_reaches_early_handler() {
        let seen = Arc::new(Mutex::new(None));
        let promise: Promise<i32> = Promise::new();

        let sink = Arc::clone(&seen);
        promise.then(move |value| {
            *sink.lock().unwrap() = Some(*value);
        });

        assert!(!promise.is_fulfilled());
        promise.fulfill(7).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn setup_error_fails_the_promise() {
        let failed = Arc::new(AtomicUsize::new(0));
        let then_called = Arc::new(AtomicUsize::new(0));

        let promise: Promise<String> = Promise::with(|_| {
            Err(Box::new(SomeError { message: "message" }) as BoxError)
        });

        let then_counter = Arc::clone(&then_called);
        let fail_counter = Arc::clone(&failed);
        promise
            .then(move |_| {
                then_counter.fetch_add(1, Ordering::SeqCst);
            })
            .fail(move |err| {
                assert_eq!(err.to_string(), "message");
                fail_counter.fetch_add(1, Ordering::SeqCst);
            });

        assert!(promise.is_failed());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(then_called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn double_fulfill_is_a_contract_violation() {
        let promise = Promise::new();
        promise.fulfill(1).unwrap();
        assert_eq!(
            promise.fulfill(2),
            Err(ContractViolation::AlreadyFulfilled)
        );
        assert_eq!(promise.value(), Some(1));
    }

    #[test]
    fn fulfill_after_throw_is_rejected() {
        let promise: Promise<i32> = Promise::new();
        promise.throw(SomeError { message: "boom" });
        assert_eq!(promise.fulfill(1), Err(ContractViolation::AlreadyFailed));
        assert!(promise.is_failed());
    }

    #[test]
    fn multi_fire_replays_latest_and_keeps_handlers() {
        // Scenario B: fulfill(1), register handler (fires immediately),
        // fulfill(2) fires the same handler again.
        let calls = Arc::new(Mutex::new(Vec::new()));
        let signal = Promise::multi();

        signal.fulfill(1).unwrap();

        let sink = Arc::clone(&calls);
        signal.then(move |value| sink.lock().unwrap().push(*value));
        assert_eq!(*calls.lock().unwrap(), vec![1]);

        signal.fulfill(2).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
        assert_eq!(signal.value(), Some(2));
    }

    #[test]
    fn multi_fire_single_fulfillment_fires_each_handler_once() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let signal = Promise::multi();

        let a = Arc::clone(&count_a);
        signal.then(move |_: &i32| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        signal.fulfill(42).unwrap();
        let b = Arc::clone(&count_b);
        signal.then(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn map_transforms_the_value() {
        let seen = Arc::new(Mutex::new(String::new()));

        let sink = Arc::clone(&seen);
        Promise::fulfilled(42)
            .map(|x| format!("the answer: {x}"))
            .then(move |s| *sink.lock().unwrap() = s.clone());

        assert_eq!(*seen.lock().unwrap(), "the answer: 42");
    }

    #[test]
    fn map_propagates_failure() {
        let promise: Promise<i32> = Promise::new();
        let mapped = promise.map(|x| x * 2);
        promise.throw(SomeError { message: "nope" });
        assert!(mapped.is_failed());
    }

    #[test]
    fn combine_flattens_a_lazy_inner_promise() {
        let outer: Promise<i32> = Promise::new();
        let inner_created = Arc::new(AtomicUsize::new(0));

        let created = Arc::clone(&inner_created);
        let combined = outer.combine(move |number| {
            created.fetch_add(1, Ordering::SeqCst);
            Promise::fulfilled(format!("number: {number}"))
        });

        assert_eq!(inner_created.load(Ordering::SeqCst), 0);
        assert!(!combined.is_fulfilled());

        outer.fulfill(42).unwrap();

        assert_eq!(inner_created.load(Ordering::SeqCst), 1);
        assert_eq!(combined.value(), Some("number: 42".to_string()));
    }

    #[test]
    fn cancelled_subscription_stops_firing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let signal = Promise::multi();

        let counter = Arc::clone(&calls);
        let subscription = signal.subscribe(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        signal.fulfill(1).unwrap();
        subscription.cancel();
        signal.fulfill(2).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_unregisters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let signal = Promise::multi();

        {
            let counter = Arc::clone(&calls);
            let _subscription = signal.subscribe(move |_: &i32| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        signal.fulfill(1).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let promise: Promise<()> = Promise::new();

        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            promise.then(move |_| sink.lock().unwrap().push(tag));
        }
        promise.fulfill(()).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
