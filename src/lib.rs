//! Asynchronous feed-synchronization core for fediverse clients
//!
//! This crate provides the value-propagation and feed-synchronization
//! machinery of a fediverse client: callback-based promises and multi-fire
//! signals, a paged live-merging feed model, the streaming transport feeding
//! it, and the session plumbing (REST client, secret storage, OAuth broker)
//! those components depend on. Rendering and layout are out of scope.

pub mod auth;
pub mod client;
pub mod entities;
pub mod feed;
pub mod signal;
pub mod streaming;

// Re-export commonly used types
pub use client::{Client, ClientConfig, ClientError, Page, RequestRange};
pub use feed::{FeedDelta, FeedItem, FeedProvider, SessionCell};
pub use signal::{AllDone, MainQueue, Promise, Subscription, ValueCell};
pub use streaming::{StreamingController, StreamingTransport, Timeline};
