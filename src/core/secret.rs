use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No OS secret service reachable. Fatal for secret-dependent
    /// operations until retried — never to be conflated with NotFound.
    #[error("Secret service unavailable: {0}")]
    Unavailable(String),
    #[error("No secret stored for '{0}'")]
    NotFound(String),
}

/// Holder of sensitive bytes (API key, OAuth token, session cookie value).
///
/// The backing memory is overwritten with zeros when the value is dropped,
/// on every exit path. There is intentionally no `Display`, `Serialize`, or
/// `Clone`: the only sanctioned read is use-and-discard via [`Secret::expose`],
/// scoped as tightly as possible.
pub struct Secret {
    inner: String,
}

impl Secret {
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Borrow the secret value. Callers must not copy it into longer-lived
    /// storage; persist through [`SecretStore::put`] instead.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Zeroize for Secret {
    fn zeroize(&mut self) {
        self.inner.zeroize();
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.inner.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// OS-keyring-backed persistence for provider credentials.
///
/// Operations are synchronous but may block on OS IPC — callers on a
/// time-critical path must isolate them (the refresh agent runs each
/// provider's pipeline in its own task for exactly this reason).
pub struct SecretStore {
    service: &'static str,
    /// Keyring entries resolved once per key and reused across operations
    entries: Mutex<HashMap<String, keyring::Entry>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::with_service("aiquota")
    }

    /// A store under a separate service name, for tests.
    pub fn with_service(service: &'static str) -> Self {
        Self {
            service,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, provider_id: &str, secret: &Secret) -> Result<(), StoreError> {
        self.with_entry(provider_id, |entry| {
            entry
                .set_password(secret.expose())
                .map_err(|e| map_keyring_error(provider_id, e))
        })
    }

    /// `Ok(None)` means no credential is stored — a normal state, not an
    /// error; callers map it to "not authenticated".
    pub fn get(&self, provider_id: &str) -> Result<Option<Secret>, StoreError> {
        self.with_entry(provider_id, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(provider_id, e)),
        })
    }

    /// Deleting an absent secret is a no-op, so logout is idempotent.
    pub fn delete(&self, provider_id: &str) -> Result<(), StoreError> {
        self.with_entry(provider_id, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(provider_id, e)),
        })
    }

    pub fn contains(&self, provider_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(provider_id)?.is_some())
    }

    fn with_entry<T>(
        &self,
        provider_id: &str,
        op: impl FnOnce(&keyring::Entry) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(provider_id) {
            let entry = keyring::Entry::new(self.service, provider_id)
                .map_err(|e| map_keyring_error(provider_id, e))?;
            entries.insert(provider_id.to_string(), entry);
        }
        op(&entries[provider_id])
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

fn map_keyring_error(provider_id: &str, err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoEntry => StoreError::NotFound(provider_id.to_string()),
        // Keyring error text can echo attacker- or platform-controlled
        // strings; run it through the sanitizer like any other error path.
        other => StoreError::Unavailable(crate::core::sanitize::redact(&other.to_string())),
    }
}
