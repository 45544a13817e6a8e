//! Credentials and authorization
//!
//! Long-lived secrets (application registrations, login tokens) live behind
//! the [`SecretStore`] contract; the OS keychain is an external collaborator
//! implementing it. [`AuthorizationBroker`] drives the OAuth
//! authorization-code flow: it hands out browser URLs tagged with a
//! correlation id and resolves the matching pending session when the
//! callback arrives.

pub mod broker;
pub mod secrets;

pub use broker::{AuthError, AuthorizationBroker, AuthorizationTicket, BrokerConfig};
pub use secrets::{MemorySecretStore, SecretError, SecretStore, SecretStoreExt};

/// OAuth access scopes the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Read,
    Write,
    Follow,
    Push,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Follow => "follow",
            Scope::Push => "push",
        }
    }

    /// Space-separated form used in registration and token requests.
    pub fn join(scopes: &[Scope]) -> String {
        scopes
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
