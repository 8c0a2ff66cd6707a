//! Public-key encryption engine consumed by the message codec.
//!
//! The codec only needs four operations from an engine: encrypt to a public key,
//! decrypt with a private key, and parse both kinds of armored key. The default
//! engine is X25519 ECIES:
//! 1. Generate an ephemeral X25519 key pair
//! 2. Perform ECDH with the recipient's public key
//! 3. Derive a symmetric key using HKDF-SHA256
//! 4. Encrypt with ChaCha20Poly1305
//!
//! and armors `ephemeral_public (32) || nonce (12) || ciphertext` as a MESSAGE block.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::armor::{armor, dearmor};
use crate::crypto::keys::{decode_public_key, decode_secret_key, KeyError};

/// HKDF info string for message key derivation.
const HKDF_INFO: &[u8] = b"ARGONCHAT-V1-MESSAGE";

/// Armor label for encrypted messages.
pub const MESSAGE_LABEL: &str = "MESSAGE";

/// Nonce size for ChaCha20Poly1305.
const NONCE_SIZE: usize = 12;

/// Minimum raw message size: ephemeral key + nonce + auth tag.
const MIN_MESSAGE_SIZE: usize = 32 + NONCE_SIZE + 16;

/// Errors returned by an encryption engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),
}

/// An asymmetric encryption engine operating on already-parsed key objects.
pub trait EncryptionEngine: Send + Sync + 'static {
    /// Parsed recipient key.
    type PublicKey: Send + Sync + 'static;
    /// Parsed local private key.
    type SecretKey: Send + Sync + 'static;

    /// Encrypts `plaintext` to `recipient`, returning armored bytes.
    fn encrypt(&self, recipient: &Self::PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Decrypts armored bytes with the local private key.
    fn decrypt(&self, key: &Self::SecretKey, armored: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Parses an armored public key.
    fn parse_public_key(&self, armored: &str) -> Result<Self::PublicKey, EngineError>;

    /// Parses an armored private key.
    fn parse_secret_key(&self, armored: &str) -> Result<Self::SecretKey, EngineError>;
}

/// X25519 + HKDF-SHA256 + ChaCha20Poly1305 engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Engine;

impl X25519Engine {
    fn derive_key(shared: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, EngineError> {
        let hk = Hkdf::<Sha256>::new(None, shared);
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(HKDF_INFO, &mut key[..])
            .map_err(|_| EngineError::EncryptionFailed("key derivation failed".to_string()))?;
        Ok(key)
    }
}

impl EncryptionEngine for X25519Engine {
    type PublicKey = PublicKey;
    type SecretKey = StaticSecret;

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);
        let shared_secret = ephemeral_secret.diffie_hellman(recipient);
        let key = Self::derive_key(shared_secret.as_bytes())?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| EngineError::EncryptionFailed(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| EngineError::EncryptionFailed(e.to_string()))?;

        let mut raw = Vec::with_capacity(32 + NONCE_SIZE + ciphertext.len());
        raw.extend_from_slice(ephemeral_public.as_bytes());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);

        Ok(armor(MESSAGE_LABEL, &raw).into_bytes())
    }

    fn decrypt(&self, key: &StaticSecret, armored: &[u8]) -> Result<Vec<u8>, EngineError> {
        let text = std::str::from_utf8(armored)
            .map_err(|_| EngineError::Malformed("not ASCII armor".to_string()))?;
        let raw = dearmor(text, MESSAGE_LABEL).map_err(|e| EngineError::Malformed(e.to_string()))?;

        if raw.len() < MIN_MESSAGE_SIZE {
            return Err(EngineError::Malformed(format!(
                "message too short: {} bytes",
                raw.len()
            )));
        }

        let mut ephemeral_bytes = [0u8; 32];
        ephemeral_bytes.copy_from_slice(&raw[..32]);
        let ephemeral_public = PublicKey::from(ephemeral_bytes);
        let nonce = Nonce::from_slice(&raw[32..32 + NONCE_SIZE]);
        let ciphertext = &raw[32 + NONCE_SIZE..];

        let shared_secret = key.diffie_hellman(&ephemeral_public);
        let sym_key = Self::derive_key(shared_secret.as_bytes())?;

        let cipher = ChaCha20Poly1305::new_from_slice(&sym_key[..])
            .map_err(|e| EngineError::DecryptionFailed(e.to_string()))?;
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EngineError::DecryptionFailed(e.to_string()))
    }

    fn parse_public_key(&self, armored: &str) -> Result<PublicKey, EngineError> {
        Ok(decode_public_key(armored)?)
    }

    fn parse_secret_key(&self, armored: &str) -> Result<StaticSecret, EngineError> {
        Ok(decode_secret_key(armored)?)
    }
}
