//! Authorization broker
//!
//! Drives the OAuth authorization-code flow for any number of concurrent
//! logins. Each [`AuthorizationBroker::authorize`] call produces a browser
//! URL carrying a generated correlation id in its `state` parameter and
//! registers a pending entry; the callback handler passes the id and code
//! back through [`AuthorizationBroker::complete`], which resolves exactly
//! the matching pending session. Entries expire after a configurable TTL so
//! abandoned logins do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::secrets::{SecretError, SecretStore, SecretStoreExt};
use super::Scope;
use crate::client::requests::{accounts, apps, oauth};
use crate::client::{Client, ClientError};
use crate::entities::{Account, ClientApplication, Token};
use crate::signal::Promise;

const APPLICATION_SERVICE: &str = "fedistream.application";
const LOGIN_SERVICE: &str = "fedistream.login";

/// Errors from the authorization flow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no pending authorization for correlation id {0}")]
    UnknownCorrelation(Uuid),

    #[error("authorization {0} expired before completion")]
    Expired(Uuid),

    #[error("secret store error: {0}")]
    Secret(#[from] SecretError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("invalid authorization url: {0}")]
    Url(#[from] url::ParseError),
}

/// Configuration for an [`AuthorizationBroker`].
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Name presented when registering the application with an instance.
    pub client_name: String,
    /// URL scheme the instance redirects back to.
    pub protocol_handler: String,
    pub scopes: Vec<Scope>,
    /// How long a started authorization may wait for its callback.
    pub pending_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_name: "fedistream".to_string(),
            protocol_handler: "fedistream".to_string(),
            scopes: vec![Scope::Read, Scope::Write, Scope::Follow],
            pending_ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the caller needs to continue a started authorization: open
/// `authorize_url` in a browser and wait on `session`.
#[derive(Clone)]
pub struct AuthorizationTicket {
    pub correlation: Uuid,
    pub authorize_url: Url,
    pub session: Promise<Arc<Client>>,
}

struct PendingAuthorization {
    instance: String,
    application: ClientApplication,
    redirect_uri: String,
    session: Promise<Arc<Client>>,
    issued_at: Instant,
}

/// Owner of all pending authorizations.
pub struct AuthorizationBroker {
    store: Arc<dyn SecretStore>,
    config: BrokerConfig,
    pending: Arc<Mutex<HashMap<Uuid, PendingAuthorization>>>,
}

impl AuthorizationBroker {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_config(store, BrokerConfig::default())
    }

    pub fn with_config(store: Arc<dyn SecretStore>, config: BrokerConfig) -> Self {
        Self {
            store,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn pending_guard(&self) -> MutexGuard<'_, HashMap<Uuid, PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild a session from a stored login, if one exists.
    pub fn restore(&self, username: &str, instance: &str) -> Result<Option<Arc<Client>>, AuthError> {
        let key = format!("{username}@{instance}");
        let Some(token) = self.store.get_value::<Token>(LOGIN_SERVICE, &key)? else {
            return Ok(None);
        };
        let client = Client::with_token(&format!("https://{instance}"), token.access_token)?;
        Ok(Some(Arc::new(client)))
    }

    /// Start an authorization against `instance`.
    ///
    /// Reuses the instance's stored application registration or registers a
    /// new one, then yields a ticket whose URL the caller opens in a
    /// browser. The ticket's session promise fulfills once the matching
    /// callback is passed to [`AuthorizationBroker::complete`].
    pub fn authorize(&self, instance: &str) -> Promise<AuthorizationTicket> {
        self.prune_expired();

        let correlation = Uuid::new_v4();
        let redirect_uri = format!("{}://authenticated", self.config.protocol_handler);
        let session: Promise<Arc<Client>> = Promise::new();
        let ticket: Promise<AuthorizationTicket> = Promise::new();

        let application = self.application_for(instance, &redirect_uri);

        let pending = Arc::clone(&self.pending);
        let scopes = self.config.scopes.clone();
        let instance_name = instance.to_string();
        let redirect = redirect_uri.clone();
        let pending_session = session.clone();
        let target = ticket.clone();
        application.then(move |app| {
            let mut authorize_url =
                match Url::parse(&format!("https://{instance_name}/oauth/authorize")) {
                    Ok(url) => url,
                    Err(err) => {
                        target.throw(AuthError::from(err));
                        return;
                    }
                };
            authorize_url
                .query_pairs_mut()
                .append_pair("scope", &Scope::join(&scopes))
                .append_pair("client_id", &app.client_id)
                .append_pair("redirect_uri", &redirect)
                .append_pair("response_type", "code")
                .append_pair("state", &correlation.to_string());

            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    correlation,
                    PendingAuthorization {
                        instance: instance_name.clone(),
                        application: app.clone(),
                        redirect_uri: redirect.clone(),
                        session: pending_session.clone(),
                        issued_at: Instant::now(),
                    },
                );

            target.forward(AuthorizationTicket {
                correlation,
                authorize_url,
                session: pending_session.clone(),
            });
        });

        let failed_session = session.clone();
        let failed_ticket = ticket.clone();
        application.fail(move |err| {
            failed_session.throw_shared(Arc::clone(err));
            failed_ticket.throw_shared(Arc::clone(err));
        });

        ticket
    }

    /// Resolve a callback: find the pending authorization matching
    /// `correlation`, exchange `code` for a token, and fulfill its session
    /// with an authenticated client. The login is persisted once the
    /// account it belongs to is known.
    pub fn complete(
        &self,
        correlation: Uuid,
        code: &str,
    ) -> Result<Promise<Arc<Client>>, AuthError> {
        let entry = self
            .pending_guard()
            .remove(&correlation)
            .ok_or(AuthError::UnknownCorrelation(correlation))?;

        if entry.issued_at.elapsed() > self.config.pending_ttl {
            entry.session.throw(AuthError::Expired(correlation));
            return Err(AuthError::Expired(correlation));
        }

        let base_url = format!("https://{}", entry.instance);
        let anonymous = Client::new(&base_url)?;
        let exchange = anonymous.run::<Token>(oauth::token(
            &entry.application.client_id,
            &entry.application.client_secret,
            &entry.redirect_uri,
            code,
            &self.config.scopes,
        ));

        let store = Arc::clone(&self.store);
        let session = entry.session.clone();
        let instance = entry.instance.clone();
        exchange.then(move |token| {
            let client = match Client::with_token(&base_url, token.access_token.clone()) {
                Ok(client) => Arc::new(client),
                Err(err) => {
                    session.throw(AuthError::from(err));
                    return;
                }
            };
            info!(instance, "authorization complete");
            session.forward(Arc::clone(&client));

            let store = Arc::clone(&store);
            let instance = instance.clone();
            let token = token.clone();
            client
                .run::<Account>(accounts::verify_credentials())
                .then(move |account| {
                    let key = format!("{}@{}", account.username, instance);
                    if let Err(err) = store.set_value(LOGIN_SERVICE, &key, &token) {
                        warn!(%err, "failed to persist login");
                    }
                });
        });

        let session = entry.session.clone();
        exchange.fail(move |err| session.throw_shared(Arc::clone(err)));

        Ok(entry.session)
    }

    /// Pending authorizations still waiting for their callback.
    pub fn pending_count(&self) -> usize {
        self.pending_guard().len()
    }

    fn application_for(&self, instance: &str, redirect_uri: &str) -> Promise<ClientApplication> {
        match self
            .store
            .get_value::<ClientApplication>(APPLICATION_SERVICE, instance)
        {
            Ok(Some(application)) => return Promise::fulfilled(application),
            Ok(None) => {}
            Err(err) => return failed(AuthError::from(err)),
        }

        let anonymous = match Client::new(&format!("https://{instance}")) {
            Ok(client) => client,
            Err(err) => return failed(AuthError::from(err)),
        };

        let registration = anonymous.run::<ClientApplication>(apps::register(
            &self.config.client_name,
            redirect_uri,
            &self.config.scopes,
        ));

        let store = Arc::clone(&self.store);
        let instance = instance.to_string();
        registration.then(move |application| {
            if let Err(err) = store.set_value(APPLICATION_SERVICE, &instance, application) {
                warn!(%err, "failed to persist application registration");
            }
        });

        registration
    }

    // Abandoned logins fail their session promise and drop out of the map.
    fn prune_expired(&self) {
        let ttl = self.config.pending_ttl;
        let mut pending = self.pending_guard();
        pending.retain(|correlation, entry| {
            if entry.issued_at.elapsed() > ttl {
                entry.session.throw(AuthError::Expired(*correlation));
                false
            } else {
                true
            }
        });
    }
}

fn failed<T: Clone + Send + Sync + 'static>(err: AuthError) -> Promise<T> {
    let promise = Promise::new();
    promise.throw(err);
    promise
}
