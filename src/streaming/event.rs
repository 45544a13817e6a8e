//! Streaming wire envelope
//!
//! Every frame is a JSON envelope `{"event": <kind>, "payload": <string>}`.
//! For `update` and `notification` the payload string is itself JSON — the
//! record is double-encoded. For `delete` the payload is the raw item id,
//! and `filters_changed` carries no payload at all.

use serde::Deserialize;
use thiserror::Error;

use crate::entities::{Notification, Status};

/// Decode failure for a single frame. The transport drops the offending
/// frame and keeps the connection; it never escalates past a log line.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing payload for {0} frame")]
    MissingPayload(&'static str),

    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

/// A decoded streaming event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new status appeared on the subscribed timeline.
    Update(Status),
    /// A notification for the logged-in account.
    Notification(Notification),
    /// The status with this id was removed.
    Delete(String),
    /// The account's filters changed; clients should refetch them.
    FiltersChanged,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Option<String>,
}

impl StreamEvent {
    /// Decode one text frame.
    pub fn decode(frame: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(frame).map_err(FrameError::Envelope)?;

        match envelope.event.as_str() {
            "update" => {
                let payload = envelope
                    .payload
                    .ok_or(FrameError::MissingPayload("update"))?;
                let status = serde_json::from_str(&payload).map_err(|source| {
                    FrameError::Payload {
                        kind: "update",
                        source,
                    }
                })?;
                Ok(StreamEvent::Update(status))
            }
            "notification" => {
                let payload = envelope
                    .payload
                    .ok_or(FrameError::MissingPayload("notification"))?;
                let notification = serde_json::from_str(&payload).map_err(|source| {
                    FrameError::Payload {
                        kind: "notification",
                        source,
                    }
                })?;
                Ok(StreamEvent::Notification(notification))
            }
            "delete" => {
                let id = envelope.payload.ok_or(FrameError::MissingPayload("delete"))?;
                Ok(StreamEvent::Delete(id))
            }
            "filters_changed" => Ok(StreamEvent::FiltersChanged),
            other => Err(FrameError::UnknownKind(other.to_string())),
        }
    }
}
