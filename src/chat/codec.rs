//! Message codec: seal plaintext into frames and open received frames.

use std::sync::Arc;

use thiserror::Error;

use crate::chat::frame::{decode_frame, encode_frame};
use crate::crypto::engine::{EncryptionEngine, EngineError};

/// Errors that can occur while sealing or opening frames.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The payload did not authenticate under our key, or was not a message.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Encryption engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of opening a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    /// Zero-length frame: the peer is present but sent nothing.
    Empty,
    /// Decrypted message bytes, exactly as sealed.
    Plaintext(Vec<u8>),
}

/// Frames and encrypts payloads with an [`EncryptionEngine`].
#[derive(Debug, Clone, Default)]
pub struct SecureCodec<E> {
    engine: E,
}

impl<E: EncryptionEngine> SecureCodec<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Encrypts `plaintext` to `recipient` and returns the framed bytes.
    pub fn seal(&self, plaintext: &[u8], recipient: &E::PublicKey) -> Result<Vec<u8>, CodecError> {
        encode_frame(&self.seal_payload(plaintext, recipient)?)
    }

    /// Opens exactly one frame from the front of `frame`.
    pub fn open(&self, frame: &[u8], key: &E::SecretKey) -> Result<Opened, CodecError> {
        let (payload, _) = decode_frame(frame)?;
        self.open_payload(payload, key)
    }

    /// Encrypts without framing.
    pub fn seal_payload(
        &self,
        plaintext: &[u8],
        recipient: &E::PublicKey,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(self.engine.encrypt(recipient, plaintext)?)
    }

    /// Decrypts an unframed payload.
    pub fn open_payload(&self, payload: &[u8], key: &E::SecretKey) -> Result<Opened, CodecError> {
        if payload.is_empty() {
            return Ok(Opened::Empty);
        }

        let plaintext = self
            .engine
            .decrypt(key, payload)
            .map_err(|e| CodecError::DecryptionFailed(e.to_string()))?;
        Ok(Opened::Plaintext(plaintext))
    }
}

/// Payload protection for one chat, shared by the send and receive tasks.
pub enum MessageCipher<E: EncryptionEngine> {
    /// End-to-end encrypted.
    Encrypted {
        codec: Arc<SecureCodec<E>>,
        secret: Arc<E::SecretKey>,
        remote: Arc<E::PublicKey>,
    },
    /// Raw UTF-8.
    Plaintext,
}

impl<E: EncryptionEngine> Clone for MessageCipher<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Encrypted {
                codec,
                secret,
                remote,
            } => Self::Encrypted {
                codec: Arc::clone(codec),
                secret: Arc::clone(secret),
                remote: Arc::clone(remote),
            },
            Self::Plaintext => Self::Plaintext,
        }
    }
}

impl<E: EncryptionEngine> MessageCipher<E> {
    pub fn encrypted(engine: E, secret: E::SecretKey, remote: E::PublicKey) -> Self {
        Self::Encrypted {
            codec: Arc::new(SecureCodec::new(engine)),
            secret: Arc::new(secret),
            remote: Arc::new(remote),
        }
    }

    /// Payload for an outgoing message.
    pub fn seal_text(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Encrypted { codec, remote, .. } => codec.seal_payload(text.as_bytes(), remote),
            Self::Plaintext => Ok(text.as_bytes().to_vec()),
        }
    }

    /// Decodes an incoming payload.
    pub fn open(&self, payload: &[u8]) -> Result<Opened, CodecError> {
        match self {
            Self::Encrypted { codec, secret, .. } => codec.open_payload(payload, secret),
            Self::Plaintext if payload.is_empty() => Ok(Opened::Empty),
            Self::Plaintext => Ok(Opened::Plaintext(payload.to_vec())),
        }
    }
}
