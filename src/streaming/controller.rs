//! Streaming session factory
//!
//! One controller per authenticated account session. The instance's
//! canonical domain — which may differ from the domain the user typed — is
//! resolved once through the instance bootstrap endpoint and memoized as a
//! one-shot promise. Transports are created lazily per timeline, connected
//! on first access, and cached so every feed provider of the session shares
//! one socket per timeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::requests::instances;
use crate::client::Client;
use crate::entities::Instance;
use crate::signal::Promise;

use super::transport::{StreamingConfig, StreamingError, StreamingTransport, Timeline};

/// Factory and cache for one session's streaming transports.
pub struct StreamingController {
    client: Arc<Client>,
    config: StreamingConfig,
    domain: Promise<String>,
    transports: Mutex<HashMap<Timeline, Promise<Arc<StreamingTransport>>>>,
}

impl StreamingController {
    /// Create a controller for a credentialed session and start resolving
    /// the streaming domain. Fails when the client carries no credential.
    pub fn new(client: Arc<Client>) -> Result<Self, StreamingError> {
        Self::with_config(client, StreamingConfig::default())
    }

    pub fn with_config(
        client: Arc<Client>,
        config: StreamingConfig,
    ) -> Result<Self, StreamingError> {
        if client.access_token().is_none() {
            return Err(StreamingError::MissingToken);
        }

        let domain = client
            .run::<Instance>(instances::current())
            .map(|instance| instance.uri.clone());

        Ok(Self::with_domain(client, domain, config))
    }

    /// Controller over an externally supplied domain promise. Useful when
    /// the domain is already known, and for tests.
    pub fn with_domain(
        client: Arc<Client>,
        domain: Promise<String>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            client,
            config,
            domain,
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// The cached, connected transport for `timeline`, created on first
    /// access once the domain has resolved.
    pub fn transport(&self, timeline: Timeline) -> Promise<Arc<StreamingTransport>> {
        let mut transports = self
            .transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = transports.get(&timeline) {
            return existing.clone();
        }

        let promise: Promise<Arc<StreamingTransport>> = Promise::new();
        let token = self.client.access_token().map(str::to_string);
        let config = self.config.clone();

        let target = promise.clone();
        self.domain.then(move |domain| {
            match StreamingTransport::with_config(domain, timeline, token.clone(), config.clone())
            {
                Ok(transport) => {
                    let transport = Arc::new(transport);
                    transport.connect();
                    target.forward(transport);
                }
                Err(err) => target.throw(err),
            }
        });
        let target = promise.clone();
        self.domain
            .fail(move |err| target.throw_shared(Arc::clone(err)));

        transports.insert(timeline, promise.clone());
        promise
    }

    pub fn user_stream(&self) -> Promise<Arc<StreamingTransport>> {
        self.transport(Timeline::User)
    }

    pub fn local_stream(&self) -> Promise<Arc<StreamingTransport>> {
        self.transport(Timeline::Local)
    }

    pub fn federated_stream(&self) -> Promise<Arc<StreamingTransport>> {
        self.transport(Timeline::Federated)
    }
}
