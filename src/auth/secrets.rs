//! Secret storage contract
//!
//! Byte-oriented get/set/delete keyed by (service, account), matching what
//! platform keychains offer. [`SecretStoreExt`] layers typed access on top
//! via JSON. [`MemorySecretStore`] backs tests and embeddings without an OS
//! keychain.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors from secret storage.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("secret store failure: {0}")]
    Storage(String),
}

/// Persistent storage for long-lived credentials.
pub trait SecretStore: Send + Sync {
    fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>, SecretError>;
    fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<(), SecretError>;
    fn delete(&self, service: &str, account: &str) -> Result<(), SecretError>;
}

/// Typed access over any [`SecretStore`].
pub trait SecretStoreExt: SecretStore {
    fn get_value<T: DeserializeOwned>(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<T>, SecretError> {
        match self.get(service, account)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_value<T: Serialize>(
        &self,
        service: &str,
        account: &str,
        value: &T,
    ) -> Result<(), SecretError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(service, account, &bytes)
    }
}

impl<S: SecretStore + ?Sized> SecretStoreExt for S {}

/// In-memory store for tests and keychain-less embeddings.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>, SecretError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(service.to_string(), account.to_string())).cloned())
    }

    fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<(), SecretError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert((service.to_string(), account.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<(), SecretError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}
