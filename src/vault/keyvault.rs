// ABOUTME: KeyVault — lazy, single-flight initialization of the 256-bit master key.
// ABOUTME: Loads from the primary backend, falls back to the key file, or generates once.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::backend::KeyBackend;

/// Master key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// The installation's symmetric master key.
///
/// Exactly one exists per installation. The raw bytes never leave the
/// vault module and are redacted from debug output.
#[derive(Clone)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub(super) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(super) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Errors from master key acquisition.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VaultError {
    /// No durable key could be obtained. Fatal: the vault must not operate
    /// with a transient key, since that would orphan all persisted data.
    #[error("no durable master key available: {0}")]
    KeyUnavailable(String),
    /// A key backend failed in a way that allows falling through.
    #[error("key backend '{backend}' failed: {message}")]
    Backend { backend: &'static str, message: String },
}

/// Obtains the master key exactly once per process lifetime.
///
/// The first caller triggers load-or-generate; concurrent first callers
/// share the same initialization future, so two racing initializations can
/// never generate and save two different keys.
pub struct KeyVault {
    primary: Box<dyn KeyBackend>,
    fallback: Option<Box<dyn KeyBackend>>,
    cell: OnceCell<MasterKey>,
}

impl KeyVault {
    /// Create a vault over an explicit backend pair. The fallback is only
    /// consulted when the primary backend is unavailable.
    pub fn new(primary: Box<dyn KeyBackend>, fallback: Option<Box<dyn KeyBackend>>) -> Self {
        Self {
            primary,
            fallback,
            cell: OnceCell::new(),
        }
    }

    /// Get the master key, initializing it on first use.
    ///
    /// Idempotent and safe to call repeatedly; initialization is
    /// single-flight across concurrent callers.
    pub async fn key(&self) -> Result<&MasterKey, VaultError> {
        self.cell
            .get_or_try_init(|| async { self.load_or_create() })
            .await
    }

    fn load_or_create(&self) -> Result<MasterKey, VaultError> {
        // Prefer an existing key wherever it lives, primary first.
        for backend in self.backends() {
            match backend.load() {
                Ok(Some(bytes)) => {
                    let key = validate_key_bytes(backend.name(), &bytes)?;
                    debug!(backend = backend.name(), "loaded existing master key");
                    return Ok(key);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "key backend load failed");
                }
            }
        }

        // No key anywhere: generate one and persist it before returning.
        let key = MasterKey::generate();
        let mut failures = Vec::new();
        for backend in self.backends() {
            if let Err(e) = backend.save(key.as_bytes()) {
                warn!(backend = backend.name(), error = %e, "key backend save failed");
                failures.push(format!("{}: {}", backend.name(), e));
                continue;
            }
            // Read the key back before trusting the backend: a store that
            // reports success but drops the write would leave every secret
            // encrypted under an unrecoverable key.
            match backend.load() {
                Ok(Some(bytes)) if bytes.as_slice() == key.as_bytes() => {
                    if backend.durability_warning() {
                        warn!(
                            backend = backend.name(),
                            "master key stored outside the platform secure backend; \
                             this is a lower security tier"
                        );
                    }
                    debug!(backend = backend.name(), "generated and saved new master key");
                    return Ok(key);
                }
                _ => {
                    warn!(
                        backend = backend.name(),
                        "saved master key could not be read back; backend is not durable"
                    );
                    failures.push(format!("{}: saved key not readable", backend.name()));
                }
            }
        }

        Err(VaultError::KeyUnavailable(failures.join("; ")))
    }

    fn backends(&self) -> impl Iterator<Item = &dyn KeyBackend> {
        std::iter::once(self.primary.as_ref()).chain(self.fallback.as_deref())
    }
}

fn validate_key_bytes(backend: &'static str, bytes: &[u8]) -> Result<MasterKey, VaultError> {
    let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::Backend {
        backend,
        message: format!("stored key has wrong length {}", bytes.len()),
    })?;
    Ok(MasterKey::from_bytes(arr))
}
