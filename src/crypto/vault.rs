//! Passphrase protection for the persisted private key.
//!
//! A protected key is stored as raw binary:
//! `salt (16) || nonce (12) || AES-256-GCM ciphertext (includes 16-byte tag)`.
//! The AES key is derived from the passphrase with Argon2i.

use std::fs;
use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::keys::write_private_file;

/// Salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-GCM.
pub const NONCE_SIZE: usize = 12;

/// Size of the blob header (salt + nonce).
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// Derived key length.
const KEY_SIZE: usize = 32;

/// Errors that can occur while protecting or unlocking a key.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Wrong passphrase or corrupted blob. The two are indistinguishable.
    #[error("Authentication failed: wrong passphrase or corrupted key file")]
    AuthenticationFailed,

    #[error("Key file too short: {0} bytes (need at least 28)")]
    Truncated(usize),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Number of passes.
    pub time_cost: u32,
    /// Memory in KiB.
    pub memory_kib: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 2,
            memory_kib: 102_400,
            parallelism: 8,
        }
    }
}

impl KdfParams {
    fn derive(&self, passphrase: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, VaultError> {
        let params = Params::new(
            self.memory_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

        let argon = Argon2::new(Algorithm::Argon2i, Version::V0x13, params);
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon
            .hash_password_into(passphrase, salt, &mut key[..])
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        Ok(key)
    }
}

/// A protected private key as persisted on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedKeyBlob {
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl std::fmt::Debug for EncryptedKeyBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedKeyBlob")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl EncryptedKeyBlob {
    /// Serializes to the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the on-disk layout. The ciphertext may be empty; that fails at unlock.
    pub fn from_bytes(data: &[u8]) -> Result<Self, VaultError> {
        if data.len() < HEADER_SIZE {
            return Err(VaultError::Truncated(data.len()));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&data[..SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&data[SALT_SIZE..HEADER_SIZE]);

        Ok(Self {
            salt,
            nonce,
            ciphertext: data[HEADER_SIZE..].to_vec(),
        })
    }

    /// Reads a blob from a key file.
    pub fn load(path: &Path) -> Result<Self, VaultError> {
        let data = fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Writes the blob with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), VaultError> {
        write_private_file(path, &self.to_bytes()).map_err(|e| match e {
            crate::crypto::keys::KeyError::IoError(io) => VaultError::IoError(io),
            other => VaultError::EncryptionFailed(other.to_string()),
        })
    }

    /// Salt used for key derivation.
    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    /// AEAD nonce.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }
}

/// Unlocked private key bytes. Wiped from memory on drop.
pub struct KeyMaterial {
    bytes: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl KeyMaterial {
    /// Raw key bytes.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    /// Key bytes as text (armored keys are ASCII).
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Encrypts raw key bytes under a passphrase with fresh salt and nonce.
pub fn protect(
    raw_key: &[u8],
    passphrase: &str,
    params: &KdfParams,
) -> Result<EncryptedKeyBlob, VaultError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let key = params.derive(passphrase.as_bytes(), &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), raw_key)
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    debug!(len = raw_key.len(), "protected key material");
    Ok(EncryptedKeyBlob {
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypts a blob with the passphrase.
pub fn unlock(
    blob: &EncryptedKeyBlob,
    passphrase: &str,
    params: &KdfParams,
) -> Result<KeyMaterial, VaultError> {
    let key = params.derive(passphrase.as_bytes(), &blob.salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|_| VaultError::AuthenticationFailed)?;

    let bytes = cipher
        .decrypt(Nonce::from_slice(&blob.nonce), &blob.ciphertext[..])
        .map_err(|_| VaultError::AuthenticationFailed)?;

    Ok(KeyMaterial {
        bytes: Zeroizing::new(bytes),
    })
}

/// Loads and unlocks a key file. A file too short to hold a header is reported as
/// an authentication failure, like any other damaged file.
pub fn unlock_file(
    path: &Path,
    passphrase: &str,
    params: &KdfParams,
) -> Result<KeyMaterial, VaultError> {
    let blob = match EncryptedKeyBlob::load(path) {
        Ok(blob) => blob,
        Err(VaultError::Truncated(_)) => return Err(VaultError::AuthenticationFailed),
        Err(e) => return Err(e),
    };
    unlock(&blob, passphrase, params)
}
