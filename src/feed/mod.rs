//! Paged, live-merging feed model
//!
//! A [`FeedProvider`] reconciles three independent update sources into one
//! ordered item list: an initial paginated fetch ([`FeedProvider::reload`]),
//! subsequent pages ([`FeedProvider::load_more`]), and out-of-band push
//! events from a streaming transport (prepends and deletes). Every mutation
//! is published as a discrete [`FeedDelta`] so a consumer can apply minimal
//! updates to whatever view it maintains.
//!
//! At most one fetch is in flight at a time; live insertions are never
//! blocked by it.

pub mod provider;

pub use provider::{FeedDelta, FeedProvider, LoadPhase, SessionCell};

/// A record that can live in a feed: cloneable, shareable, and carrying a
/// stable identity used for delete matching.
pub trait FeedItem: Clone + Send + Sync + 'static {
    fn feed_id(&self) -> &str;
}
