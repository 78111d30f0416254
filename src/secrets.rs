//! API key storage boundary.
//!
//! Keys are opaque strings; they are passed through to the OS keychain and
//! never logged. An in-memory store backs tests and headless environments
//! without a keychain daemon.

use crate::error::AnalysisError;
use std::collections::HashMap;
use std::sync::Mutex;

const SERVICE_NAME: &str = "photo-describe";

/// Opaque string key/value secret storage.
pub trait SecretStore: Send + Sync {
    fn store(&self, name: &str, secret: &str) -> Result<(), AnalysisError>;
    fn retrieve(&self, name: &str) -> Result<Option<String>, AnalysisError>;
    fn clear(&self, name: &str) -> Result<(), AnalysisError>;
}

/// OS keychain storage via the keyring crate: GNOME Keyring / KWallet on
/// Linux, Keychain on macOS, Credential Manager on Windows.
#[derive(Default)]
pub struct KeychainStore;

impl KeychainStore {
    fn entry(name: &str) -> Result<keyring::Entry, AnalysisError> {
        let account = format!("{}-api-key", name);
        keyring::Entry::new(SERVICE_NAME, &account)
            .map_err(|e| AnalysisError::Secret(e.to_string()))
    }
}

impl SecretStore for KeychainStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), AnalysisError> {
        Self::entry(name)?
            .set_password(secret)
            .map_err(|e| AnalysisError::Secret(e.to_string()))
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, AnalysisError> {
        match Self::entry(name)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AnalysisError::Secret(e.to_string())),
        }
    }

    fn clear(&self, name: &str) -> Result<(), AnalysisError> {
        match Self::entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AnalysisError::Secret(e.to_string())),
        }
    }
}

/// Process-local store for tests and environments without a keychain.
#[derive(Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl SecretStore for MemoryStore {
    fn store(&self, name: &str, secret: &str) -> Result<(), AnalysisError> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| AnalysisError::Secret("poisoned lock".to_string()))?;
        secrets.insert(name.to_string(), secret.to_string());
        Ok(())
    }

    fn retrieve(&self, name: &str) -> Result<Option<String>, AnalysisError> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|_| AnalysisError::Secret("poisoned lock".to_string()))?;
        Ok(secrets.get(name).cloned())
    }

    fn clear(&self, name: &str) -> Result<(), AnalysisError> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| AnalysisError::Secret("poisoned lock".to_string()))?;
        secrets.remove(name);
        Ok(())
    }
}
