//! Key generation and armored key files.
//!
//! Keys are X25519. Public keys are stored armored (`.asc`); private keys are
//! armored in memory and only ever written to disk wrapped by the vault (`.bin`).

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::armor::{armor, armor_secret, dearmor, ArmorError};

/// Armor label for public keys.
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Armor label for private keys.
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// Errors that can occur during key operations.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid armor: {0}")]
    InvalidArmor(#[from] ArmorError),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An X25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &BASE64.encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the secret key.
    pub fn secret_key(&self) -> &StaticSecret {
        &self.secret
    }

    /// Armored public key text.
    pub fn armored_public(&self) -> String {
        encode_public_key(&self.public)
    }

    /// Armored private key text, wiped when dropped.
    pub fn armored_secret(&self) -> Zeroizing<String> {
        encode_secret_key(&self.secret)
    }
}

/// Encodes a public key as armored text.
pub fn encode_public_key(key: &PublicKey) -> String {
    armor(PUBLIC_KEY_LABEL, key.as_bytes())
}

/// Encodes a secret key as armored text.
pub fn encode_secret_key(key: &StaticSecret) -> Zeroizing<String> {
    let bytes = Zeroizing::new(key.to_bytes());
    armor_secret(PRIVATE_KEY_LABEL, &bytes[..])
}

/// Decodes an armored public key.
pub fn decode_public_key(text: &str) -> Result<PublicKey, KeyError> {
    let bytes = dearmor(text, PUBLIC_KEY_LABEL)?;
    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidKeyLength {
            expected: 32,
            got: bytes.len(),
        })?;
    Ok(PublicKey::from(key_bytes))
}

/// Decodes an armored secret key.
pub fn decode_secret_key(text: &str) -> Result<StaticSecret, KeyError> {
    let bytes = Zeroizing::new(dearmor(text, PRIVATE_KEY_LABEL)?);
    if bytes.len() != 32 {
        return Err(KeyError::InvalidKeyLength {
            expected: 32,
            got: bytes.len(),
        });
    }

    let mut key_bytes = Zeroizing::new([0u8; 32]);
    key_bytes.copy_from_slice(&bytes);
    Ok(StaticSecret::from(*key_bytes))
}

/// Writes an armored public key file.
pub fn save_public_key(key: &PublicKey, path: &Path) -> Result<(), KeyError> {
    fs::write(path, encode_public_key(key))?;
    Ok(())
}

/// Writes a private file with owner-only permissions on Unix.
pub fn write_private_file(path: &Path, data: &[u8]) -> Result<(), KeyError> {
    fs::write(path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
