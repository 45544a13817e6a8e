//! REST client for the server's paginated API
//!
//! [`Client`] wraps an HTTP client with the base URL and bearer credential
//! of one account session. Requests are described by [`ApiRequest`] values
//! built in [`requests`]; execution happens on a spawned task and completes
//! a [`crate::signal::Promise`], which is the seam the feed layer consumes.
//!
//! Paging follows the server's `Link` response header: each page carries
//! opaque `next`/`previous` cursors, and `next == None` means no further
//! pages exist.

pub mod pagination;
pub mod requests;
pub mod rest;

pub use pagination::{Page, PageCursor, Pagination, RequestRange};
pub use rest::{ApiRequest, Client, ClientConfig, ClientError};
