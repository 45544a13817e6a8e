//! Domain records exchanged with the server
//!
//! The subset of the Mastodon API surface the synchronization core actually
//! touches. Every feed-able record carries a stable string id used for
//! delete matching; timestamps are RFC 3339 and decode into `chrono` types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::FeedItem;

/// An account on some instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// `user` for local accounts, `user@domain` for remote ones.
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A status (toot) on a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub uri: String,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    /// HTML body as delivered by the server.
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    /// The boosted status, when this one is a reblog.
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
}

/// Kinds of notification the server pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Reblog,
    Favourite,
    Follow,
    #[serde(other)]
    Unknown,
}

/// A notification addressed to the logged-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Instance metadata from the bootstrap call. `uri` is the canonical domain
/// the streaming endpoints live on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
}

/// A registered client application and its OAuth credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientApplication {
    #[serde(default)]
    pub id: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl FeedItem for Status {
    fn feed_id(&self) -> &str {
        &self.id
    }
}

impl FeedItem for Notification {
    fn feed_id(&self) -> &str {
        &self.id
    }
}
