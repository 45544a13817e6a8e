//! Streaming transport
//!
//! One [`StreamingTransport`] owns one websocket subscription to one logical
//! timeline. Decoded events are republished through multi-fire signals;
//! malformed frames are dropped with a warning and the connection stays up.
//!
//! The upstream protocol has no keepalive contract beyond websocket pings,
//! and a dropped connection stops emitting silently — so the read loop
//! reconnects with capped exponential backoff by default. Use
//! [`ReconnectPolicy::disabled`] for connect-once behavior.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::event::{FrameError, StreamEvent};
use crate::entities::{Notification, Status};
use crate::signal::{Promise, ValueCell};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors from the streaming layer.
#[derive(Debug, Error)]
pub enum StreamingError {
    #[error("invalid streaming endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("streaming requires an access credential")]
    MissingToken,
}

/// Result type for streaming operations.
pub type Result<T> = std::result::Result<T, StreamingError>;

/// The logical timelines the streaming API serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeline {
    /// The logged-in account's home timeline plus its notifications.
    User,
    /// Public statuses from this instance only.
    Local,
    /// The federated firehose.
    Federated,
}

impl Timeline {
    /// Value of the `stream` query parameter.
    pub fn stream_param(&self) -> &'static str {
        match self {
            Timeline::User => "user",
            Timeline::Local => "public:local",
            Timeline::Federated => "public",
        }
    }
}

/// Reconnect behavior after a dropped or failed connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Retry attempts before giving up. Zero disables reconnection.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for the exponential delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect; a dropped connection stays dropped.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff for the given attempt (1-based): exponential, capped, with
    /// half the interval randomized so concurrent clients spread out.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let exponential = self.base_delay.saturating_mul(1u32 << shift);
        let capped = exponential.min(self.max_delay);
        capped / 2 + capped.mul_f64(rand::thread_rng().gen::<f64>() / 2.0)
    }
}

/// Configuration for a [`StreamingTransport`].
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Handshake timeout.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Connection lifecycle, observable through [`StreamingTransport::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// A persistent subscription to one timeline's push stream.
pub struct StreamingTransport {
    endpoint: Url,
    access_token: Option<String>,
    config: StreamingConfig,
    updates: Promise<Status>,
    notifications: Promise<Notification>,
    deletes: Promise<String>,
    filters_changed: Promise<()>,
    state: ValueCell<ConnectionState>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingTransport {
    /// Transport for `timeline` on `domain` with the default configuration.
    pub fn new(domain: &str, timeline: Timeline, access_token: Option<String>) -> Result<Self> {
        Self::with_config(domain, timeline, access_token, StreamingConfig::default())
    }

    pub fn with_config(
        domain: &str,
        timeline: Timeline,
        access_token: Option<String>,
        config: StreamingConfig,
    ) -> Result<Self> {
        let mut endpoint = Url::parse(&format!("wss://{domain}/api/v1/streaming/"))?;
        endpoint
            .query_pairs_mut()
            .append_pair("stream", timeline.stream_param());

        Ok(Self {
            endpoint,
            access_token,
            config,
            updates: Promise::multi(),
            notifications: Promise::multi(),
            deletes: Promise::multi(),
            filters_changed: Promise::multi(),
            state: ValueCell::new(ConnectionState::Idle),
            reader: Mutex::new(None),
        })
    }

    /// Start the read loop. Idempotent while a loop is running.
    pub fn connect(self: &Arc<Self>) {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() {
            return;
        }
        let transport = Arc::clone(self);
        *reader = Some(tokio::spawn(async move { transport.run().await }));
    }

    /// Tear down the connection. The transport stops emitting; signals stay
    /// valid for late subscribers.
    pub fn disconnect(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            self.state.set(ConnectionState::Disconnected);
        }
    }

    /// New statuses on the subscribed timeline.
    pub fn updates(&self) -> &Promise<Status> {
        &self.updates
    }

    /// Notifications for the logged-in account (user timeline only).
    pub fn notifications(&self) -> &Promise<Notification> {
        &self.notifications
    }

    /// Ids of removed statuses.
    pub fn deletes(&self) -> &Promise<String> {
        &self.deletes
    }

    /// Fires when the account's filters change.
    pub fn filters_changed(&self) -> &Promise<()> {
        &self.filters_changed
    }

    /// Observable connection lifecycle.
    pub fn state(&self) -> &ValueCell<ConnectionState> {
        &self.state
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            self.state.set(ConnectionState::Connecting);
            match self.open_socket().await {
                Ok(mut socket) => {
                    attempt = 0;
                    self.state.set(ConnectionState::Connected);
                    info!(endpoint = %self.endpoint, "streaming connected");

                    while let Some(message) = socket.next().await {
                        match message {
                            Ok(Message::Text(frame)) => self.dispatch(&frame),
                            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                            Ok(Message::Close(_)) => break,
                            Ok(other) => {
                                warn!(kind = ?other, "ignoring non-text frame");
                            }
                            Err(err) => {
                                warn!(%err, "websocket read failed");
                                break;
                            }
                        }
                    }
                    self.state.set(ConnectionState::Disconnected);
                }
                Err(err) => {
                    warn!(endpoint = %self.endpoint, %err, "streaming connect failed");
                    self.state.set(ConnectionState::Disconnected);
                }
            }

            attempt += 1;
            if attempt > self.config.reconnect.max_retries {
                info!(endpoint = %self.endpoint, "giving up on streaming connection");
                break;
            }
            let delay = self.config.reconnect.delay_for(attempt);
            debug!(?delay, attempt, "reconnecting after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    async fn open_socket(&self) -> Result<WsStream> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| StreamingError::Handshake(err.to_string()))?;
        if let Some(token) = &self.access_token {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| StreamingError::Handshake("invalid credential header".into()))?;
            request.headers_mut().insert("authorization", value);
        }

        let connect = tokio_tungstenite::connect_async(request);
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Err(_) => Err(StreamingError::Timeout(self.config.connect_timeout)),
            Ok(Err(err)) => Err(StreamingError::Handshake(err.to_string())),
            Ok(Ok((socket, _response))) => Ok(socket),
        }
    }

    // One frame in, at most one signal out. A frame that fails to decode is
    // dropped here; it must not take the connection down.
    fn dispatch(&self, frame: &str) {
        match StreamEvent::decode(frame) {
            Ok(StreamEvent::Update(status)) => self.updates.emit(status),
            Ok(StreamEvent::Notification(notification)) => {
                self.notifications.emit(notification)
            }
            Ok(StreamEvent::Delete(id)) => self.deletes.emit(id),
            Ok(StreamEvent::FiltersChanged) => self.filters_changed.emit(()),
            Err(err) => warn!(%err, frame, "dropping malformed frame"),
        }
    }
}

impl Drop for StreamingTransport {
    fn drop(&mut self) {
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for StreamingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}
