// ABOUTME: Credential vault — platform-backed master key plus encrypted secret storage.
// ABOUTME: KeyBackend selection, single-flight key init, AES-256-GCM blobs, and the secret map.

pub mod backend;
pub mod crypto;
pub mod keyvault;
pub mod store;

pub use backend::{FileBackend, KeyBackend, KeyringBackend};
pub use crypto::{CryptoError, EncryptedBlob};
pub use keyvault::{KeyVault, MasterKey, VaultError};
pub use store::{SecretStore, StoreError};
