//! Callback-based futures and multi-fire signals
//!
//! This module provides the value-propagation primitive the rest of the crate
//! is built on: [`Promise<T>`], a single type usable either as a one-shot
//! future (fulfilled exactly once) or as a multi-fire event signal (fulfilled
//! repeatedly, replaying its latest value to new subscribers).
//!
//! # Core Concepts
//!
//! ## Promise<T>
//!
//! A shared handle to a state machine over `{pending, fulfilled, failed}`.
//! Handlers registered with `then`/`fail` observe the stored value or error
//! immediately when one exists, and future fulfillments for multi-fire
//! signals.
//!
//! ```text
//! one-shot:   pending ──fulfill──▶ fulfilled        (terminal)
//!             pending ──throw────▶ failed           (terminal)
//!
//! multi-fire: pending ──fulfill──▶ fulfilled ──fulfill──▶ fulfilled …
//!                      ──throw───▶ failed            (terminal)
//! ```
//!
//! ## ValueCell<T>
//!
//! A mutable value box that emits `will_change`/`did_change` through two
//! multi-fire signals on every assignment.
//!
//! ## MainQueue
//!
//! A serialized executor. [`Promise::via`] re-delivers a promise's
//! fulfillments on a queue, preserving order, so handlers that mutate
//! UI-adjacent state all run on one consumer.
//!
//! # Ordering
//!
//! For a given fulfillment, handlers observe it in registration order.
//! Fulfillments of one signal are delivered in the order they occur. No
//! ordering is guaranteed across independent promises.

pub mod cell;
pub mod combinators;
pub mod promise;
pub mod queue;

pub use cell::ValueCell;
pub use combinators::{all_done, AllDone};
pub use promise::{ContractViolation, Promise, SharedError, Subscription};
pub use queue::{MainQueue, MainQueueRunner};

/// Boxed error type accepted at the promise setup boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
