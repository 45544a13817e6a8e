//! Feed synchronization scenarios aligned with user stories

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use fedistream::client::{Page, PageCursor, Pagination, RequestRange};
use fedistream::entities::{Account, Status};
use fedistream::feed::{FeedDelta, FeedProvider, LoadPhase, SessionCell};
use fedistream::signal::{Promise, ValueCell};
use fedistream::Client;

fn status(id: &str) -> Status {
    Status {
        id: id.to_string(),
        uri: format!("https://example.social/statuses/{id}"),
        created_at: Utc::now(),
        account: Account {
            id: "1".into(),
            username: "max".into(),
            acct: "max@example.social".into(),
            display_name: "Max".into(),
            url: None,
            avatar: None,
        },
        content: format!("<p>status {id}</p>"),
        url: None,
        sensitive: false,
        spoiler_text: String::new(),
        reblogs_count: 0,
        favourites_count: 0,
        reblog: None,
    }
}

fn statuses(ids: std::ops::Range<usize>) -> Vec<Status> {
    ids.map(|n| status(&n.to_string())).collect()
}

fn next_cursor(token: &str) -> PageCursor {
    Pagination::from_link_header(&format!(
        "<https://example.social/api/v1/timelines/home?max_id={token}>; rel=\"next\""
    ))
    .next
    .expect("cursor")
}

fn attached_session() -> SessionCell {
    let session: SessionCell = ValueCell::new(None);
    session.set(Some(Arc::new(Client::new("https://example.social").unwrap())));
    session
}

/// Scripted page source: records every requested range and answers from a
/// queue of prepared promises.
#[derive(Clone, Default)]
struct FetchScript {
    requests: Arc<Mutex<Vec<RequestRange>>>,
    responses: Arc<Mutex<VecDeque<Promise<Page<Status>>>>>,
}

impl FetchScript {
    fn push(&self, response: Promise<Page<Status>>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn requests(&self) -> Vec<RequestRange> {
        self.requests.lock().unwrap().clone()
    }

    fn provider(&self) -> FeedProvider<Status> {
        let script = self.clone();
        FeedProvider::new(attached_session(), move |_, range| {
            script.requests.lock().unwrap().push(range.clone());
            script
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        })
    }
}

/// Simplified delta trace for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Ready,
    Set(usize),
    Prepend(usize),
    Append(usize),
    Delete(usize),
    Failed(LoadPhase),
}

fn record(provider: &FeedProvider<Status>) -> (Arc<Mutex<Vec<Tag>>>, fedistream::Subscription) {
    let tags = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tags);
    let subscription = provider.subscribe(move |delta| {
        let tag = match delta {
            FeedDelta::Ready => Tag::Ready,
            FeedDelta::Set(n) => Tag::Set(*n),
            FeedDelta::Prepend(n) => Tag::Prepend(*n),
            FeedDelta::Append(n) => Tag::Append(*n),
            FeedDelta::Delete(i) => Tag::Delete(*i),
            FeedDelta::LoadFailed { phase, .. } => Tag::Failed(*phase),
        };
        sink.lock().unwrap().push(tag);
    });
    // Subscribing replays the latest delta; assertions below care about
    // fresh emissions only.
    tags.lock().unwrap().clear();
    (tags, subscription)
}

/// User Story: a fresh timeline loads its first page and can keep paging
///
/// Acceptance Criteria:
/// - `reload` fetches the default range and replaces the item list
/// - the page's `next` cursor is retained
/// - a following `load_more` fetches exactly that cursor and appends
#[test]
fn scenario_a_reload_then_load_more_uses_the_returned_cursor() {
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..20),
        next: Some(next_cursor("cursor-2")),
        previous: None,
    }));
    script.push(Promise::fulfilled(Page {
        items: statuses(20..25),
        next: None,
        previous: None,
    }));

    let provider = script.provider();
    let (tags, _sub) = record(&provider);

    provider.reload();
    assert_eq!(provider.len(), 20);
    assert!(provider.has_more());

    provider.load_more();
    assert_eq!(provider.len(), 25);
    assert!(!provider.has_more());

    assert_eq!(
        script.requests(),
        vec![
            RequestRange::Default,
            RequestRange::Cursor(next_cursor("cursor-2")),
        ]
    );
    assert_eq!(*tags.lock().unwrap(), vec![Tag::Set(20), Tag::Append(5)]);
}

/// User Story: at most one fetch is ever in flight
///
/// Acceptance Criteria:
/// - `reload` while loading performs no fetch and produces no delta
/// - `load_more` while loading performs no fetch and produces no delta
#[test]
fn loading_gate_blocks_concurrent_fetches() {
    let script = FetchScript::default();
    script.push(Promise::new()); // reload stays in flight

    let provider = script.provider();
    let (tags, _sub) = record(&provider);

    provider.reload();
    assert!(provider.is_loading());

    provider.reload();
    provider.load_more();

    assert_eq!(script.requests().len(), 1);
    assert!(tags.lock().unwrap().is_empty());
}

/// User Story: the end of a feed stays quiet
///
/// Acceptance Criteria:
/// - `load_more` with no stored `next` cursor performs no fetch and
///   produces no delta
#[test]
fn load_more_without_a_cursor_is_a_no_op() {
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..3),
        next: None,
        previous: None,
    }));

    let provider = script.provider();
    provider.reload();
    let (tags, _sub) = record(&provider);

    provider.load_more();

    assert_eq!(script.requests().len(), 1);
    assert!(tags.lock().unwrap().is_empty());
    assert!(!provider.is_loading());
}

/// Scenario C: a streamed delete removes exactly the matching item.
#[test]
fn scenario_c_delete_removes_the_matching_index() {
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..10),
        next: None,
        previous: None,
    }));

    let deletes = Promise::multi();
    let mut provider = script.provider();
    provider.on_delete(&deletes);
    provider.reload();
    let (tags, _sub) = record(&provider);

    let doomed = provider.items()[3].id.clone();
    let successor = provider.items()[4].id.clone();
    deletes.emit(doomed);

    assert_eq!(provider.len(), 9);
    assert_eq!(provider.items()[3].id, successor);
    assert_eq!(*tags.lock().unwrap(), vec![Tag::Delete(3)]);
}

/// Scenario D: a pushed status lands at the front of the feed.
#[test]
fn scenario_d_pushed_status_is_prepended() {
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..5),
        next: None,
        previous: None,
    }));

    let updates = Promise::multi();
    let mut provider = script.provider();
    provider.on_insert(&updates);
    provider.reload();
    assert!(!provider.is_loading());
    let (tags, _sub) = record(&provider);

    updates.emit(status("live"));

    assert_eq!(provider.len(), 6);
    assert_eq!(provider.items()[0].id, "live");
    assert_eq!(*tags.lock().unwrap(), vec![Tag::Prepend(1)]);
}

/// User Story: live pushes and paging reconcile into one ordered list
///
/// Acceptance Criteria:
/// - a status pushed while `load_more` is in flight is prepended
///   immediately, not blocked by the loading gate
/// - the append that completes afterwards lands at the end
/// - both deltas arrive in emission order
#[test]
fn prepend_races_an_in_flight_append() {
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..3),
        next: Some(next_cursor("older")),
        previous: None,
    }));
    let in_flight: Promise<Page<Status>> = Promise::new();
    script.push(in_flight.clone());

    let updates = Promise::multi();
    let mut provider = script.provider();
    provider.on_insert(&updates);
    provider.reload();
    let (tags, _sub) = record(&provider);

    provider.load_more();
    assert!(provider.is_loading());

    updates.emit(status("live"));
    assert_eq!(provider.len(), 4);

    in_flight
        .fulfill(Page {
            items: statuses(3..5),
            next: None,
            previous: None,
        })
        .unwrap();

    let ids: Vec<String> = provider.items().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec!["live", "0", "1", "2", "3", "4"]);
    assert_eq!(
        *tags.lock().unwrap(),
        vec![Tag::Prepend(1), Tag::Append(2)]
    );
}

/// User Story: failures surface instead of disappearing
///
/// Acceptance Criteria:
/// - a failed fetch clears the loading gate
/// - a `LoadFailed` delta carries the phase that failed
/// - a later `reload` fetches again
#[test]
fn fetch_failure_surfaces_a_delta_and_allows_retry() {
    #[derive(Debug, thiserror::Error)]
    #[error("gateway timeout")]
    struct GatewayTimeout;

    let script = FetchScript::default();
    script.push(Promise::with(|_| Err(GatewayTimeout.into())));
    script.push(Promise::fulfilled(Page {
        items: statuses(0..2),
        next: None,
        previous: None,
    }));

    let provider = script.provider();
    let (tags, _sub) = record(&provider);

    provider.reload();
    assert!(!provider.is_loading());
    assert!(provider.is_empty());

    provider.reload();
    assert_eq!(provider.len(), 2);

    assert_eq!(
        *tags.lock().unwrap(),
        vec![Tag::Failed(LoadPhase::Reload), Tag::Set(2)]
    );
}

/// User Story: a feed announces readiness exactly once
#[test]
fn ready_precedes_the_first_reload() {
    let session: SessionCell = ValueCell::new(None);
    let script = FetchScript::default();
    script.push(Promise::fulfilled(Page {
        items: statuses(0..1),
        next: None,
        previous: None,
    }));

    let loader_script = script.clone();
    let provider = FeedProvider::new(session.clone(), move |_, range| {
        loader_script.requests.lock().unwrap().push(range.clone());
        loader_script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    });
    let (tags, _sub) = record(&provider);

    // Nothing can load before a session exists.
    provider.reload();
    assert!(script.requests().is_empty());

    session.set(Some(Arc::new(Client::new("https://example.social").unwrap())));
    provider.reload();

    assert_eq!(*tags.lock().unwrap(), vec![Tag::Ready, Tag::Set(1)]);
}
