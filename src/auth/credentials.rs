//! Remembered credentials - system keychain and in-memory backends

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keychain account holding the remembered login pair
const LOGIN_ACCOUNT: &str = "login";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialStoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("stored credential is corrupt: {0}")]
    Corrupt(String),
}

/// Username plus secret password
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Credential::new(self.username.clone(), self.password.expose_secret())
    }
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredLogin {
    username: String,
    password: String,
}

/// Backend for remembered credentials
pub trait CredentialStore: Send + Sync {
    fn get_login(&self) -> Result<Option<Credential>, CredentialStoreError>;
    fn set_login(&self, credential: &Credential) -> Result<(), CredentialStoreError>;
    fn delete_login(&self) -> Result<(), CredentialStoreError>;

    fn get_key(&self, name: &str) -> Result<Option<SecretString>, CredentialStoreError>;
    fn set_key(&self, name: &str, value: &SecretString) -> Result<(), CredentialStoreError>;
    fn delete_key(&self, name: &str) -> Result<(), CredentialStoreError>;
}

fn encode_login(credential: &Credential) -> Result<String, CredentialStoreError> {
    serde_json::to_string(&StoredLogin {
        username: credential.username.clone(),
        password: credential.password.expose_secret().to_string(),
    })
    .map_err(|e| CredentialStoreError::Corrupt(e.to_string()))
}

fn decode_login(raw: &str) -> Result<Credential, CredentialStoreError> {
    let stored: StoredLogin =
        serde_json::from_str(raw).map_err(|e| CredentialStoreError::Corrupt(e.to_string()))?;
    Ok(Credential::new(stored.username, stored.password))
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn get_login(&self) -> Result<Option<Credential>, CredentialStoreError> {
        (**self).get_login()
    }

    fn set_login(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        (**self).set_login(credential)
    }

    fn delete_login(&self) -> Result<(), CredentialStoreError> {
        (**self).delete_login()
    }

    fn get_key(&self, name: &str) -> Result<Option<SecretString>, CredentialStoreError> {
        (**self).get_key(name)
    }

    fn set_key(&self, name: &str, value: &SecretString) -> Result<(), CredentialStoreError> {
        (**self).set_key(name, value)
    }

    fn delete_key(&self, name: &str) -> Result<(), CredentialStoreError> {
        (**self).delete_key(name)
    }
}

/// System keychain under one service name
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        KeyringStore {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, CredentialStoreError> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| CredentialStoreError::Unavailable(format!("Keychain entry creation failed: {e}")))
    }

    fn read(&self, account: &str) -> Result<Option<String>, CredentialStoreError> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialStoreError::Unavailable(format!(
                "Keychain retrieval failed: {e}"
            ))),
        }
    }

    fn write(&self, account: &str, value: &str) -> Result<(), CredentialStoreError> {
        self.entry(account)?
            .set_password(value)
            .map_err(|e| CredentialStoreError::Unavailable(format!("Keychain storage failed: {e}")))
    }

    fn remove(&self, account: &str) -> Result<(), CredentialStoreError> {
        match self.entry(account)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialStoreError::Unavailable(format!(
                "Keychain deletion failed: {e}"
            ))),
        }
    }
}

impl CredentialStore for KeyringStore {
    fn get_login(&self) -> Result<Option<Credential>, CredentialStoreError> {
        self.read(LOGIN_ACCOUNT)?
            .map(|raw| decode_login(&raw))
            .transpose()
    }

    fn set_login(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        self.write(LOGIN_ACCOUNT, &encode_login(credential)?)
    }

    fn delete_login(&self) -> Result<(), CredentialStoreError> {
        self.remove(LOGIN_ACCOUNT)
    }

    fn get_key(&self, name: &str) -> Result<Option<SecretString>, CredentialStoreError> {
        Ok(self.read(name)?.map(SecretString::from))
    }

    fn set_key(&self, name: &str, value: &SecretString) -> Result<(), CredentialStoreError> {
        self.write(name, value.expose_secret())
    }

    fn delete_key(&self, name: &str) -> Result<(), CredentialStoreError> {
        self.remove(name)
    }
}

/// In-process store; `unavailable()` builds one that fails every call
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing: bool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        MemoryStore {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of backend calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> Result<T, CredentialStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CredentialStoreError::Unavailable("keychain is locked".to_string()));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut entries))
    }
}

impl CredentialStore for MemoryStore {
    fn get_login(&self) -> Result<Option<Credential>, CredentialStoreError> {
        self.with_entries(|e| e.get(LOGIN_ACCOUNT).cloned())?
            .map(|raw| decode_login(&raw))
            .transpose()
    }

    fn set_login(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let raw = encode_login(credential)?;
        self.with_entries(|e| {
            e.insert(LOGIN_ACCOUNT.to_string(), raw);
        })
    }

    fn delete_login(&self) -> Result<(), CredentialStoreError> {
        self.with_entries(|e| {
            e.remove(LOGIN_ACCOUNT);
        })
    }

    fn get_key(&self, name: &str) -> Result<Option<SecretString>, CredentialStoreError> {
        Ok(self
            .with_entries(|e| e.get(name).cloned())?
            .map(SecretString::from))
    }

    fn set_key(&self, name: &str, value: &SecretString) -> Result<(), CredentialStoreError> {
        let value = value.expose_secret().to_string();
        self.with_entries(|e| {
            e.insert(name.to_string(), value);
        })
    }

    fn delete_key(&self, name: &str) -> Result<(), CredentialStoreError> {
        self.with_entries(|e| {
            e.remove(name);
        })
    }
}

/// Wraps a store and stops using it after the first failure.
///
/// The failure is logged once; afterwards every call degrades to
/// "no credential" without touching the backend.
pub struct GuardedStore {
    inner: Box<dyn CredentialStore>,
    disabled: AtomicBool,
}

impl GuardedStore {
    pub fn new(inner: Box<dyn CredentialStore>) -> Self {
        GuardedStore {
            inner,
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.disabled.load(Ordering::SeqCst)
    }

    fn guard<T>(
        &self,
        action: &str,
        call: impl FnOnce(&dyn CredentialStore) -> Result<T, CredentialStoreError>,
    ) -> Option<T> {
        if !self.is_available() {
            return None;
        }
        match call(self.inner.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                if !self.disabled.swap(true, Ordering::SeqCst) {
                    tracing::warn!(action, error = %e, "Credential store failed, disabling it for this session");
                }
                None
            }
        }
    }

    pub fn get_login(&self) -> Option<Credential> {
        self.guard("read login", |s| s.get_login()).flatten()
    }

    /// Returns whether the credential was stored
    pub fn set_login(&self, credential: &Credential) -> bool {
        self.guard("store login", |s| s.set_login(credential)).is_some()
    }

    pub fn delete_login(&self) {
        self.guard("delete login", |s| s.delete_login());
    }

    pub fn get_key(&self, name: &str) -> Option<SecretString> {
        self.guard("read key", |s| s.get_key(name)).flatten()
    }

    pub fn set_key(&self, name: &str, value: &SecretString) -> bool {
        self.guard("store key", |s| s.set_key(name, value)).is_some()
    }

    pub fn delete_key(&self, name: &str) {
        self.guard("delete key", |s| s.delete_key(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.set_login(&Credential::new("ada", "s3cret")).unwrap();
        let login = store.get_login().unwrap().unwrap();
        assert_eq!(login.username, "ada");
        assert_eq!(login.password.expose_secret(), "s3cret");

        store.delete_login().unwrap();
        assert!(store.get_login().unwrap().is_none());
        assert!(store.get_key("api_key").unwrap().is_none());
    }

    #[test]
    fn test_guarded_store_disables_after_first_failure() {
        let backend = Arc::new(MemoryStore::unavailable());
        let guarded = GuardedStore::new(Box::new(Arc::clone(&backend)));

        assert!(guarded.get_login().is_none());
        assert!(!guarded.is_available());
        assert!(!guarded.set_key("api_key", &SecretString::from("k".to_string())));
        assert!(guarded.get_key("api_key").is_none());
        guarded.delete_login();

        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_guarded_store_passes_through() {
        let guarded = GuardedStore::new(Box::new(MemoryStore::new()));
        assert!(guarded.set_key("api_key", &SecretString::from("abc".to_string())));
        assert_eq!(guarded.get_key("api_key").unwrap().expose_secret(), "abc");
        guarded.delete_key("api_key");
        assert!(guarded.get_key("api_key").is_none());
        assert!(guarded.is_available());
    }
}
