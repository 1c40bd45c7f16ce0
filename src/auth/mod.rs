//! Access token persistence and the mount-gated token store

use crate::navigation::{login_path, Navigator};
use crate::store::{Mounted, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
const KEYRING_SERVICE: &str = "yourapp";

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Token must not be empty")]
    EmptyToken,
}

/// Persistent key-value slot holding the bearer token.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Option<String>, TokenError>;
    fn set(&self, token: &str) -> Result<(), TokenError>;
    fn remove(&self) -> Result<(), TokenError>;
}

/// Token kept in the OS keychain.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, TokenError> {
        keyring::Entry::new(&self.service, ACCESS_TOKEN_KEY)
            .map_err(|e| TokenError::StorageError(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Result<Option<String>, TokenError> {
        match self.entry()?.get_password() {
            Ok(token) if token.is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TokenError::StorageError(e.to_string())),
        }
    }

    fn set(&self, token: &str) -> Result<(), TokenError> {
        if token.is_empty() {
            return Err(TokenError::EmptyToken);
        }
        self.entry()?
            .set_password(token)
            .map_err(|e| TokenError::StorageError(e.to_string()))
    }

    fn remove(&self) -> Result<(), TokenError> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TokenError::StorageError(e.to_string())),
        }
    }
}

/// In-process token slot, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), token.to_string());
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, TokenError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| TokenError::StorageError(e.to_string()))?;
        Ok(entries.get(ACCESS_TOKEN_KEY).cloned())
    }

    fn set(&self, token: &str) -> Result<(), TokenError> {
        if token.is_empty() {
            return Err(TokenError::EmptyToken);
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| TokenError::StorageError(e.to_string()))?;
        entries.insert(ACCESS_TOKEN_KEY.to_string(), token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), TokenError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| TokenError::StorageError(e.to_string()))?;
        entries.remove(ACCESS_TOKEN_KEY);
        Ok(())
    }
}

/// Reactive view of the stored token.
///
/// Stays `None` until the gate is mounted. On mount the token is read once;
/// when it is missing the navigator is sent to the login page.
pub struct AccessToken;

impl AccessToken {
    pub fn attach(
        mounted: &Mounted,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        return_url: Option<String>,
    ) -> Store<Option<String>> {
        let access_token = Store::new(None);
        let publish = access_token.clone();

        mounted.store().subscribe(move |is_mounted| {
            if !*is_mounted {
                return;
            }

            let token = match tokens.get() {
                Ok(token) => token,
                Err(e) => {
                    log::warn!("Failed to read access token: {}", e);
                    None
                }
            };

            match token {
                Some(token) => publish.set(Some(token)),
                None => {
                    log::info!("No access token, redirecting to login");
                    navigator.goto(&login_path(return_url.as_deref()));
                }
            }
        });

        access_token
    }
}
