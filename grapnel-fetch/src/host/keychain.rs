//! Secret storage for login credentials.
//!
//! Usernames and passwords never go into config files. They live in the
//! system keychain (macOS Keychain, Windows Credential Manager, Linux Secret
//! Service) behind [`SecretStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::KeychainError;

/// Service name prefix for Grapnel secrets.
const SERVICE_PREFIX: &str = "grapnel";

/// Well-known secret names.
pub mod secrets {
    /// Login username.
    pub const USERNAME: &str = "username";
    /// Login password.
    pub const PASSWORD: &str = "password";
}

// ============================================================================
// Secret Store Trait
// ============================================================================

/// API for secret storage, scoped by account.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads a secret. `Ok(None)` means not stored.
    async fn get(&self, account: &str, key: &str) -> Result<Option<String>, KeychainError>;

    /// Stores a secret.
    async fn set(&self, account: &str, key: &str, secret: &str) -> Result<(), KeychainError>;

    /// Deletes a secret. Deleting a missing secret succeeds.
    async fn delete(&self, account: &str, key: &str) -> Result<(), KeychainError>;

    /// Reads the username and password pair, if both are stored.
    async fn login_credentials(
        &self,
        account: &str,
    ) -> Result<Option<(String, String)>, KeychainError> {
        let username = self.get(account, secrets::USERNAME).await?;
        let password = self.get(account, secrets::PASSWORD).await?;
        Ok(username.zip(password))
    }
}

// ============================================================================
// System Keychain
// ============================================================================

/// [`SecretStore`] backed by the `keyring` crate.
#[derive(Debug, Clone, Default)]
pub struct SystemKeychain;

impl SystemKeychain {
    /// Creates a new system keychain instance.
    pub fn new() -> Self {
        Self
    }

    fn service(account: &str) -> String {
        format!("{SERVICE_PREFIX}:{account}")
    }

    fn entry(account: &str, key: &str) -> Result<Entry, KeychainError> {
        Entry::new(&Self::service(account), key).map_err(KeychainError::from)
    }
}

#[async_trait]
impl SecretStore for SystemKeychain {
    async fn get(&self, account: &str, key: &str) -> Result<Option<String>, KeychainError> {
        let entry = Self::entry(account, key)?;
        match entry.get_password() {
            Ok(secret) if !secret.is_empty() => {
                debug!(account = %account, key = %key, "Secret found");
                Ok(Some(secret))
            }
            Ok(_) | Err(keyring::Error::NoEntry) => {
                debug!(account = %account, key = %key, "Secret not found");
                Ok(None)
            }
            Err(e) => {
                warn!(account = %account, key = %key, error = %e, "Failed to read secret");
                Err(e.into())
            }
        }
    }

    async fn set(&self, account: &str, key: &str, secret: &str) -> Result<(), KeychainError> {
        Self::entry(account, key)?.set_password(secret).map_err(|e| {
            warn!(account = %account, key = %key, error = %e, "Failed to store secret");
            KeychainError::from(e)
        })
    }

    async fn delete(&self, account: &str, key: &str) -> Result<(), KeychainError> {
        match Self::entry(account, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!(account = %account, key = %key, error = %e, "Failed to delete secret");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// [`SecretStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a username and password for `account`.
    pub fn with_login(account: &str, username: &str, password: &str) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.secrets.lock() {
            map.insert((account.to_string(), secrets::USERNAME.to_string()), username.to_string());
            map.insert((account.to_string(), secrets::PASSWORD.to_string()), password.to_string());
        }
        store
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), String>>, KeychainError> {
        self.secrets
            .lock()
            .map_err(|_| KeychainError::Unavailable("secret map poisoned".to_string()))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, account: &str, key: &str) -> Result<Option<String>, KeychainError> {
        Ok(self.lock()?.get(&(account.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, account: &str, key: &str, secret: &str) -> Result<(), KeychainError> {
        self.lock()?
            .insert((account.to_string(), key.to_string()), secret.to_string());
        Ok(())
    }

    async fn delete(&self, account: &str, key: &str) -> Result<(), KeychainError> {
        self.lock()?.remove(&(account.to_string(), key.to_string()));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name() {
        assert_eq!(SystemKeychain::service("alice"), "grapnel:alice");
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySecretStore::new();
        assert_eq!(store.get("a", "k").await.unwrap(), None);

        store.set("a", "k", "v").await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("b", "k").await.unwrap(), None);

        store.delete("a", "k").await.unwrap();
        store.delete("a", "k").await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_credentials_need_both() {
        let store = MemorySecretStore::with_login("acct", "alice", "hunter2");
        assert_eq!(
            store.login_credentials("acct").await.unwrap(),
            Some(("alice".to_string(), "hunter2".to_string()))
        );

        store.delete("acct", secrets::PASSWORD).await.unwrap();
        assert_eq!(store.login_credentials("acct").await.unwrap(), None);
    }
}
