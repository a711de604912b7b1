// ABOUTME: Key storage backends — OS keychain via the keyring crate, plus a file fallback.
// ABOUTME: Each backend exposes load/save over raw key bytes; selection happens once at construction.

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use super::keyvault::VaultError;

/// Fixed service identifier under which the key entry is registered with
/// the platform secret store.
pub const KEYRING_SERVICE: &str = "lockclaw";
/// Fixed entry name for the master key.
pub const KEYRING_ENTRY: &str = "master-key";

/// Storage backend for the master key.
///
/// One variant per platform tier, selected once when the vault is built,
/// not through scattered conditionals.
pub trait KeyBackend: Send + Sync {
    /// Short name for log events.
    fn name(&self) -> &'static str;

    /// Load the stored key bytes, or `None` if no key has been saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>, VaultError>;

    /// Persist the key bytes durably.
    fn save(&self, key: &[u8]) -> Result<(), VaultError>;

    /// Whether saving here deserves a security warning (non-native tier).
    fn durability_warning(&self) -> bool {
        false
    }
}

/// Platform secure backend: OS keychain / secret-service via `keyring`.
pub struct KeyringBackend {
    service: String,
    entry: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            entry: KEYRING_ENTRY.to_string(),
        }
    }

    // Only targets with a real credential store enabled in Cargo.toml may
    // use this backend; elsewhere keyring falls back to an in-memory mock
    // that would silently lose the key on process exit.
    #[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
    fn entry(&self) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(&self.service, &self.entry).map_err(|e| VaultError::Backend {
            backend: "keyring",
            message: e.to_string(),
        })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    fn entry(&self) -> Result<keyring::Entry, VaultError> {
        Err(VaultError::Backend {
            backend: "keyring",
            message: "no platform secret store on this target".into(),
        })
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn load(&self) -> Result<Option<Vec<u8>>, VaultError> {
        match self.entry()?.get_password() {
            Ok(encoded) => {
                let bytes = B64.decode(encoded.trim()).map_err(|_| VaultError::Backend {
                    backend: "keyring",
                    message: "stored key entry is not valid base64".into(),
                })?;
                Ok(Some(bytes))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::Backend {
                backend: "keyring",
                message: e.to_string(),
            }),
        }
    }

    fn save(&self, key: &[u8]) -> Result<(), VaultError> {
        self.entry()?
            .set_password(&B64.encode(key))
            .map_err(|e| VaultError::Backend {
                backend: "keyring",
                message: e.to_string(),
            })
    }
}

/// File fallback backend: `base64(key)` in a private per-user file.
///
/// Lower security tier than the platform keychain — the key is only
/// protected by filesystem permissions. Used when the native backend is
/// unavailable, never silently treated as equivalent (the vault logs a
/// warning when it saves here).
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl KeyBackend for FileBackend {
    fn name(&self) -> &'static str {
        "key-file"
    }

    fn load(&self) -> Result<Option<Vec<u8>>, VaultError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let encoded = std::fs::read_to_string(&self.path).map_err(|e| VaultError::Backend {
            backend: "key-file",
            message: e.to_string(),
        })?;
        let bytes = B64.decode(encoded.trim()).map_err(|_| VaultError::Backend {
            backend: "key-file",
            message: "key file is not valid base64".into(),
        })?;
        Ok(Some(bytes))
    }

    fn save(&self, key: &[u8]) -> Result<(), VaultError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
            std::fs::write(&tmp, B64.encode(key))?;
            set_owner_only(&tmp)?;
            std::fs::rename(&tmp, &self.path)?;
            set_owner_only(&self.path)?;
            Ok(())
        };
        write().map_err(|e| VaultError::Backend {
            backend: "key-file",
            message: e.to_string(),
        })
    }

    fn durability_warning(&self) -> bool {
        true
    }
}

/// Restrict a file to the owning user.
#[cfg(unix)]
pub(crate) fn set_owner_only(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub(crate) fn set_owner_only(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
