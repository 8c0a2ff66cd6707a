//! Chat error types.

use thiserror::Error;

use crate::chat::codec::CodecError;
use crate::crypto::engine::EngineError;
use crate::crypto::vault::VaultError;
use crate::keychain::KeychainError;
use crate::sam::ControlError;

/// Errors that can occur while setting up or running a chat.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Router control-port failure. Aborts the room attempt.
    #[error("Router error: {0}")]
    Control(#[from] ControlError),

    /// Key unlock failed. Raised before any network I/O.
    #[error("Key vault error: {0}")]
    Vault(#[from] VaultError),

    /// Frame or payload failure.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Key parsing failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Alias lookup failure.
    #[error("Keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// The unlocked private key is not valid armored text.
    #[error("Unlocked key is not a valid private key")]
    InvalidKeyMaterial,

    /// An encrypted session was started without keys.
    #[error("Encrypted mode needs both a private key and the peer's public key")]
    MissingKeys,

    /// Config directory could not be determined.
    #[error("Config directory not found. Unable to determine home directory.")]
    NoConfigDir,

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
