//! Cryptographic building blocks.
//!
//! - `armor`: ASCII armor for keys and messages
//! - `keys`: X25519 key pairs and key files
//! - `engine`: public-key message encryption
//! - `vault`: passphrase protection of the private key at rest

pub mod armor;
pub mod engine;
pub mod keys;
pub mod vault;

pub use engine::{EncryptionEngine, EngineError, X25519Engine};
pub use keys::{KeyError, KeyPair};
pub use vault::{EncryptedKeyBlob, KdfParams, KeyMaterial, VaultError};
