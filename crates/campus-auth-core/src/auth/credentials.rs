use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

/// Keychain service name for the keyring backend
const SERVICE_NAME: &str = "campus-portal";

/// Credentials file name for the file backend
const CREDENTIALS_FILE: &str = "credentials.json";

/// The two values the portal persists between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    Access,
    Renewal,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 2] = [CredentialKey::Access, CredentialKey::Renewal];

    /// Well-known storage name, shared with the web client.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::Access => "token",
            CredentialKey::Renewal => "refreshToken",
        }
    }
}

/// Durable key-value persistence for the access and renewal credentials.
///
/// Values are stored verbatim: no expiry metadata, no encryption. Expiry is
/// always derived from the token's own claims.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Result<Option<String>>;

    fn set(&self, key: CredentialKey, value: &str) -> Result<()>;

    /// Removing an absent key is not an error.
    fn clear(&self, key: CredentialKey) -> Result<()>;

    fn clear_all(&self) -> Result<()> {
        for key in CredentialKey::ALL {
            self.clear(key)?;
        }
        Ok(())
    }
}

/// Credentials kept in the OS keychain.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: CredentialKey) -> Result<Entry> {
        Entry::new(&self.service, key.as_str()).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store credential in keychain")
    }

    fn clear(&self, key: CredentialKey) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

/// Credentials kept as a small JSON object on disk.
///
/// The file is rewritten on every change and removed once it holds nothing.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Store credentials in `dir/credentials.json`
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join(CREDENTIALS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read credentials file")?;
        serde_json::from_str(&contents).context("Failed to parse credentials file")
    }

    fn write(&self, values: &HashMap<String, String>) -> Result<()> {
        if values.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove credentials file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents).context("Failed to write credentials file")
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read()?;
        apply(&mut values);
        self.write(&values)
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.remove(key.as_str()))
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        debug!(key = key.as_str(), "Persisting credential");
        self.update(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
        })
    }

    fn clear(&self, key: CredentialKey) -> Result<()> {
        self.update(|values| {
            values.remove(key.as_str());
        })
    }

    /// Removes the file without reading it, so an unreadable file can
    /// always be cleared.
    fn clear_all(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove credentials file")?;
        }
        Ok(())
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<CredentialKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: CredentialKey) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&key).cloned())
    }

    fn set(&self, key: CredentialKey, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key, value.to_string());
        Ok(())
    }

    fn clear(&self, key: CredentialKey) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(&key);
        Ok(())
    }
}
