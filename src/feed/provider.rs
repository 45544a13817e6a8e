//! Feed provider
//!
//! State machine over `{is_loading}` with an ordered item list and opaque
//! pagination cursors. All mutations funnel through one internal core so
//! index-carrying deltas are computed against the list state at the moment
//! the mutation happens.
//!
//! The provider stays unready until a session is attached to its shared
//! [`SessionCell`]; attaching emits a single [`FeedDelta::Ready`], after
//! which the owner is expected to call [`FeedProvider::reload`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use super::FeedItem;
use crate::client::requests::{notifications, timelines};
use crate::client::{Client, Page, PageCursor, RequestRange};
use crate::entities::{Notification, Status};
use crate::signal::{Promise, SharedError, Subscription, ValueCell};

/// Shared cell holding the account session a feed belongs to. Empty until
/// authentication completes.
pub type SessionCell = ValueCell<Option<Arc<Client>>>;

/// Which fetch a failure delta belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Reload,
    LoadMore,
}

/// Discrete mutation notification, the provider's full outward contract.
#[derive(Debug, Clone)]
pub enum FeedDelta {
    /// A session was attached; the feed can be loaded now.
    Ready,
    /// The list was replaced with this many fresh items.
    Set(usize),
    /// This many items were inserted at the front.
    Prepend(usize),
    /// This many items were added at the end.
    Append(usize),
    /// The item previously at this index was removed.
    Delete(usize),
    /// A fetch failed; the loading gate is released and the list unchanged.
    LoadFailed { phase: LoadPhase, error: SharedError },
}

type Loader<T> = Box<dyn Fn(&Arc<Client>, &RequestRange) -> Promise<Page<T>> + Send + Sync>;

struct FeedState<T> {
    items: Vec<T>,
    next_page: Option<PageCursor>,
    previous_page: Option<PageCursor>,
}

struct FeedCore<T: FeedItem> {
    session: SessionCell,
    loader: Loader<T>,
    state: Mutex<FeedState<T>>,
    is_loading: AtomicBool,
    ready_emitted: AtomicBool,
    deltas: Promise<FeedDelta>,
}

impl<T: FeedItem> FeedCore<T> {
    fn state(&self) -> MutexGuard<'_, FeedState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(self: &Arc<Self>, phase: LoadPhase) {
        if phase == LoadPhase::LoadMore && self.state().next_page.is_none() {
            return;
        }

        // The sole mutual exclusion on network-triggered operations.
        if self
            .is_loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let Some(client) = self.session.get() else {
            self.is_loading.store(false, Ordering::Release);
            return;
        };

        let range = match phase {
            LoadPhase::Reload => RequestRange::Default,
            LoadPhase::LoadMore => match self.state().next_page.clone() {
                Some(cursor) => RequestRange::Cursor(cursor),
                None => {
                    self.is_loading.store(false, Ordering::Release);
                    return;
                }
            },
        };

        let fetch = (self.loader)(&client, &range);
        let weak = Arc::downgrade(self);
        fetch.then(move |page| {
            if let Some(core) = weak.upgrade() {
                core.apply_page(phase, page.clone());
            }
        });
        let weak = Arc::downgrade(self);
        fetch.fail(move |err| {
            if let Some(core) = weak.upgrade() {
                core.load_failed(phase, Arc::clone(err));
            }
        });
    }

    fn apply_page(&self, phase: LoadPhase, page: Page<T>) {
        let delta = {
            let mut state = self.state();
            let count = page.items.len();
            match phase {
                LoadPhase::Reload => {
                    state.items = page.items;
                    state.next_page = page.next;
                    state.previous_page = page.previous;
                    FeedDelta::Set(count)
                }
                LoadPhase::LoadMore => {
                    state.items.extend(page.items);
                    state.next_page = page.next;
                    FeedDelta::Append(count)
                }
            }
        };
        self.is_loading.store(false, Ordering::Release);
        self.deltas.emit(delta);
    }

    fn load_failed(&self, phase: LoadPhase, error: SharedError) {
        self.is_loading.store(false, Ordering::Release);
        warn!(?phase, %error, "feed fetch failed");
        self.deltas.emit(FeedDelta::LoadFailed { phase, error });
    }

    // Live insertion is deliberately not gated by `is_loading`.
    fn insert(&self, item: T) {
        {
            let mut state = self.state();
            state.items.insert(0, item);
        }
        self.deltas.emit(FeedDelta::Prepend(1));
    }

    fn delete(&self, id: &str) {
        let index = {
            let mut state = self.state();
            match state.items.iter().position(|item| item.feed_id() == id) {
                Some(index) => {
                    state.items.remove(index);
                    Some(index)
                }
                None => None,
            }
        };
        match index {
            Some(index) => self.deltas.emit(FeedDelta::Delete(index)),
            None => debug!(id, "delete for unknown item ignored"),
        }
    }

    fn emit_ready(&self) {
        if self
            .ready_emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.deltas.emit(FeedDelta::Ready);
        }
    }
}

/// Paged, live-merging collection model for one timeline.
pub struct FeedProvider<T: FeedItem> {
    core: Arc<FeedCore<T>>,
    subscriptions: Vec<Subscription>,
}

impl<T: FeedItem> FeedProvider<T> {
    /// Create a provider over `loader`, which turns a session and a range
    /// into one page fetch.
    pub fn new<L>(session: SessionCell, loader: L) -> Self
    where
        L: Fn(&Arc<Client>, &RequestRange) -> Promise<Page<T>> + Send + Sync + 'static,
    {
        let core = Arc::new(FeedCore {
            session,
            loader: Box::new(loader),
            state: Mutex::new(FeedState {
                items: Vec::new(),
                next_page: None,
                previous_page: None,
            }),
            is_loading: AtomicBool::new(false),
            ready_emitted: AtomicBool::new(false),
            deltas: Promise::multi(),
        });

        let weak = Arc::downgrade(&core);
        let readiness = core.session.did_change().subscribe(move |client| {
            if client.is_some() {
                if let Some(core) = weak.upgrade() {
                    core.emit_ready();
                }
            }
        });

        Self {
            core,
            subscriptions: vec![readiness],
        }
    }

    /// Merge a push-item signal: each emission is prepended at index 0.
    pub fn on_insert(&mut self, signal: &Promise<T>) {
        let weak = Arc::downgrade(&self.core);
        self.subscriptions.push(signal.subscribe(move |item| {
            if let Some(core) = weak.upgrade() {
                core.insert(item.clone());
            }
        }));
    }

    /// Merge a delete signal carrying item identities.
    pub fn on_delete(&mut self, signal: &Promise<String>) {
        let weak = Arc::downgrade(&self.core);
        self.subscriptions.push(signal.subscribe(move |id| {
            if let Some(core) = weak.upgrade() {
                core.delete(id);
            }
        }));
    }

    /// Replace the list with the first page. No-op while a fetch is in
    /// flight or before a session is attached.
    pub fn reload(&self) {
        self.core.load(LoadPhase::Reload);
    }

    /// Append the next page. No-op while a fetch is in flight or when no
    /// further page exists.
    pub fn load_more(&self) {
        self.core.load(LoadPhase::LoadMore);
    }

    /// The delta signal. Multi-fire; late subscribers replay the latest
    /// delta.
    pub fn deltas(&self) -> &Promise<FeedDelta> {
        &self.core.deltas
    }

    /// Register a delta listener, returning its unsubscribe handle.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&FeedDelta) + Send + Sync + 'static,
    {
        self.core.deltas.subscribe(handler)
    }

    /// Snapshot of the current items in feed order.
    pub fn items(&self) -> Vec<T> {
        self.core.state().items.clone()
    }

    pub fn len(&self) -> usize {
        self.core.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.state().items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.core.is_loading.load(Ordering::Acquire)
    }

    /// Whether a session is attached.
    pub fn ready(&self) -> bool {
        self.core.session.get().is_some()
    }

    /// Whether a further page exists.
    pub fn has_more(&self) -> bool {
        self.core.state().next_page.is_some()
    }
}

impl FeedProvider<Status> {
    /// The logged-in account's home timeline, merged with streaming updates
    /// and deletes.
    pub fn home(
        session: SessionCell,
        updates: &Promise<Status>,
        deletes: &Promise<String>,
    ) -> Self {
        let mut provider = Self::new(session, |client, range| {
            client.run_paginated(timelines::home(range))
        });
        provider.on_insert(updates);
        provider.on_delete(deletes);
        provider
    }

    /// This instance's local public timeline.
    pub fn local(
        session: SessionCell,
        updates: &Promise<Status>,
        deletes: &Promise<String>,
    ) -> Self {
        let mut provider = Self::new(session, |client, range| {
            client.run_paginated(timelines::public(true, range))
        });
        provider.on_insert(updates);
        provider.on_delete(deletes);
        provider
    }

    /// The federated public timeline.
    pub fn federated(
        session: SessionCell,
        updates: &Promise<Status>,
        deletes: &Promise<String>,
    ) -> Self {
        let mut provider = Self::new(session, |client, range| {
            client.run_paginated(timelines::public(false, range))
        });
        provider.on_insert(updates);
        provider.on_delete(deletes);
        provider
    }
}

impl FeedProvider<Notification> {
    /// The logged-in account's notifications.
    pub fn notifications(session: SessionCell, updates: Option<&Promise<Notification>>) -> Self {
        let mut provider = Self::new(session, |client, range| {
            client.run_paginated(notifications::all(range))
        });
        if let Some(updates) = updates {
            provider.on_insert(updates);
        }
        provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::fixtures;
    use std::sync::Mutex as StdMutex;

    fn attached_session() -> SessionCell {
        let session: SessionCell = ValueCell::new(None);
        session.set(Some(Arc::new(Client::new("https://example.social").unwrap())));
        session
    }

    fn page_of(ids: &[&str], next: Option<PageCursor>) -> Page<Status> {
        Page {
            items: ids.iter().map(|id| fixtures::status(id)).collect(),
            next,
            previous: None,
        }
    }

    #[test]
    fn ready_fires_once_when_a_session_attaches() {
        let session: SessionCell = ValueCell::new(None);
        let provider: FeedProvider<Status> =
            FeedProvider::new(session.clone(), |_, _| Promise::new());
        assert!(!provider.ready());

        let ready_count = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&ready_count);
        let _sub = provider.subscribe(move |delta| {
            if matches!(delta, FeedDelta::Ready) {
                *counter.lock().unwrap() += 1;
            }
        });

        session.set(Some(Arc::new(Client::new("https://example.social").unwrap())));
        session.set(Some(Arc::new(Client::new("https://example.social").unwrap())));

        assert!(provider.ready());
        assert_eq!(*ready_count.lock().unwrap(), 1);
    }

    #[test]
    fn prepend_is_not_gated_by_loading() {
        let updates = Promise::multi();
        let mut provider: FeedProvider<Status> =
            FeedProvider::new(attached_session(), |_, _| Promise::new());
        provider.on_insert(&updates);

        // Fetch stays pending: the gate is held.
        provider.reload();
        assert!(provider.is_loading());

        updates.emit(fixtures::status("live"));
        assert_eq!(provider.len(), 1);
        assert!(provider.is_loading());
    }

    #[test]
    fn delete_for_absent_identity_is_a_no_op() {
        let deletes = Promise::multi();
        let mut provider: FeedProvider<Status> = FeedProvider::new(attached_session(), |_, _| {
            Promise::fulfilled(Page {
                items: vec![fixtures::status("1")],
                next: None,
                previous: None,
            })
        });
        provider.on_delete(&deletes);
        provider.reload();

        let deltas = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&deltas);
        let _sub = provider.subscribe(move |delta| {
            if matches!(delta, FeedDelta::Delete(_)) {
                sink.lock().unwrap().push(delta.clone());
            }
        });

        deletes.emit("missing".to_string());

        assert_eq!(provider.len(), 1);
        assert!(deltas.lock().unwrap().is_empty());
    }

    #[test]
    fn unattached_provider_does_not_wedge_the_gate() {
        let session: SessionCell = ValueCell::new(None);
        let provider: FeedProvider<Status> =
            FeedProvider::new(session, |_, _| Promise::new());

        provider.reload();
        assert!(!provider.is_loading());
    }

    #[test]
    fn load_failure_releases_the_gate_and_surfaces_a_delta() {
        #[derive(Debug, thiserror::Error)]
        #[error("connection reset")]
        struct Reset;

        let provider: FeedProvider<Status> =
            FeedProvider::new(attached_session(), |_, _| {
                Promise::with(|_| Err(Reset.into()))
            });

        let failures = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let _sub = provider.subscribe(move |delta| {
            if let FeedDelta::LoadFailed { phase, .. } = delta {
                sink.lock().unwrap().push(*phase);
            }
        });

        provider.reload();

        assert!(!provider.is_loading());
        assert_eq!(*failures.lock().unwrap(), vec![LoadPhase::Reload]);
        assert!(provider.is_empty());
    }

    #[test]
    fn reload_replaces_rather_than_appends() {
        let provider: FeedProvider<Status> = FeedProvider::new(attached_session(), |_, _| {
            Promise::fulfilled(page_of(&["a", "b"], None))
        });

        provider.reload();
        provider.reload();

        assert_eq!(provider.len(), 2);
    }
}
