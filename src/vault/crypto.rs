// ABOUTME: Authenticated encryption for the secret store — AES-256-GCM with per-call random nonces.
// ABOUTME: EncryptedBlob wire form is base64(iv) ":" base64(ciphertext‖tag).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand::RngCore;
use rand::rngs::OsRng;

use super::keyvault::MasterKey;

/// GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Delimiter between the encoded iv and ciphertext in the wire form.
const WIRE_DELIMITER: char = ':';

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The blob's wire form is not `b64(iv):b64(ciphertext)`.
    #[error("encrypted blob is malformed")]
    Malformed,
    /// Authentication tag mismatch: tampering, corruption, or wrong key.
    /// Decryption fails closed — no partial plaintext is ever returned.
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
}

/// An encrypted payload: random iv plus ciphertext with appended auth tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to the on-disk text form.
    pub fn to_wire(&self) -> String {
        format!(
            "{}{}{}",
            B64.encode(&self.iv),
            WIRE_DELIMITER,
            B64.encode(&self.ciphertext)
        )
    }

    /// Parse the on-disk text form.
    pub fn from_wire(wire: &str) -> Result<Self, CryptoError> {
        let (iv_b64, ct_b64) = wire
            .trim()
            .split_once(WIRE_DELIMITER)
            .ok_or(CryptoError::Malformed)?;
        let iv = B64.decode(iv_b64).map_err(|_| CryptoError::Malformed)?;
        let ciphertext = B64.decode(ct_b64).map_err(|_| CryptoError::Malformed)?;
        if iv.len() != NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        Ok(Self { iv, ciphertext })
    }
}

/// Encrypt a plaintext under the master key with a fresh random nonce.
///
/// The nonce comes from the OS CSPRNG on every call; reusing a nonce under
/// the same key would break GCM, so no caller-supplied nonces exist.
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<EncryptedBlob, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(EncryptedBlob {
        iv: iv.to_vec(),
        ciphertext,
    })
}

/// Decrypt a blob under the master key. Fails closed on any tag mismatch.
pub fn decrypt(key: &MasterKey, blob: &EncryptedBlob) -> Result<Vec<u8>, CryptoError> {
    if blob.iv.len() != NONCE_LEN {
        return Err(CryptoError::Malformed);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(&blob.iv), blob.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}
