// ABOUTME: SecretStore — an encrypted name → JSON map persisted as a single blob file.
// ABOUTME: Every read-modify-write decrypts, mutates, and rewrites the whole map atomically.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::backend::set_owner_only;
use super::crypto::{self, CryptoError, EncryptedBlob};
use super::keyvault::{KeyVault, VaultError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    /// The store file exists but cannot be decrypted or parsed. Reported
    /// distinctly from "no data" so tampering never masquerades as a clean
    /// first run.
    #[error("secret store is unreadable (corrupted, tampered, or wrong key): {0}")]
    Unreadable(#[source] CryptoError),
    #[error("secret store encryption failed: {0}")]
    Encrypt(#[source] CryptoError),
    #[error("secret store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("secret store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encrypted persistence for a small set of named secrets.
///
/// The whole map is one `EncryptedBlob` on disk; updates re-encrypt and
/// rewrite the entire file. Deliberate simplicity trade-off for tens of
/// entries, not thousands.
pub struct SecretStore {
    vault: Arc<KeyVault>,
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    write_lock: tokio::sync::Mutex<()>,
}

impl SecretStore {
    pub fn new(vault: Arc<KeyVault>, path: PathBuf) -> Self {
        Self {
            vault,
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Look up a secret by name. A missing store file means "absent";
    /// an unreadable store file is a distinct error.
    pub async fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_map().await?.get(name).cloned())
    }

    /// Names of all stored secrets, sorted. Values are never listed.
    pub async fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.read_map().await?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Insert or replace a secret. Last write wins.
    pub async fn save(&self, name: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(name.to_string(), value);
        self.write_map(&map).await?;
        debug!(name, "secret saved");
        Ok(())
    }

    /// Remove a secret. Returns whether an entry existed.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let removed = map.remove(name).is_some();
        if removed {
            self.write_map(&map).await?;
            debug!(name, "secret deleted");
        }
        Ok(removed)
    }

    async fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let wire = match tokio::fs::read_to_string(&self.path).await {
            Ok(wire) => wire,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        let key = self.vault.key().await?;
        let blob = EncryptedBlob::from_wire(&wire).map_err(StoreError::Unreadable)?;
        let plaintext = crypto::decrypt(key, &blob).map_err(StoreError::Unreadable)?;

        match serde_json::from_slice::<Value>(&plaintext) {
            Ok(Value::Object(map)) => Ok(map),
            // Decryption succeeded but the payload is not the expected map.
            _ => Err(StoreError::Unreadable(CryptoError::Malformed)),
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let key = self.vault.key().await?;
        let plaintext = serde_json::to_vec(&Value::Object(map.clone()))?;
        let blob = crypto::encrypt(key, &plaintext).map_err(StoreError::Encrypt)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
        tokio::fs::write(&tmp, blob.to_wire()).await?;
        set_owner_only(&tmp)?;
        tokio::fs::rename(&tmp, &self.path).await?;
        set_owner_only(&self.path)?;
        Ok(())
    }
}
