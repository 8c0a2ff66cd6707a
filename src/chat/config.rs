//! Chat configuration.
//!
//! Settings are read once at startup from `settings.toml` and passed by value
//! into a session. Nothing changes them while a chat is running.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;
use crate::crypto::vault::KdfParams;
use crate::sam::{SessionOptions, DEFAULT_ROUTER_ADDR};

/// Default time a host waits for a peer, in seconds.
pub const DEFAULT_ACCEPT_WAIT_SECS: u64 = 30;

/// Default accept polling interval, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// How chat payloads are carried.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// End-to-end encrypted with the peer's public key.
    #[default]
    Encrypted,

    /// Raw UTF-8 frames. The overlay still encrypts the transport, but the
    /// messages themselves are not end-to-end protected.
    Plaintext,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Router control port address.
    pub router_addr: String,

    /// How long a host waits for an inbound peer.
    pub accept_wait_secs: u64,

    /// Granularity of the accept loop.
    pub poll_interval_ms: u64,

    /// Payload mode.
    pub message_mode: MessageMode,

    /// Destination and session options.
    pub session: SessionOptions,

    /// Passphrase KDF cost.
    pub kdf: KdfParams,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            router_addr: DEFAULT_ROUTER_ADDR.to_string(),
            accept_wait_secs: DEFAULT_ACCEPT_WAIT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            message_mode: MessageMode::default(),
            session: SessionOptions::default(),
            kdf: KdfParams::default(),
        }
    }
}

impl ChatConfig {
    /// Loads settings from the default location, or defaults if absent.
    pub fn load() -> Result<Self, ChatError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads settings from `path`, or defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: ChatConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// `<config_dir>/argonchat/settings.toml`.
    pub fn config_path() -> Result<PathBuf, ChatError> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or(ChatError::NoConfigDir)?;
        Ok(config_dir.join("argonchat").join(SETTINGS_FILE))
    }

    /// Accept budget as a duration.
    pub fn accept_wait(&self) -> Duration {
        Duration::from_secs(self.accept_wait_secs)
    }

    /// Poll interval as a duration. Never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// True when messages are end-to-end encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.message_mode == MessageMode::Encrypted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.router_addr, "127.0.0.1:7656");
        assert_eq!(config.accept_wait(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.is_encrypted());
        assert_eq!(config.session.signature_type, 7);
        assert_eq!(config.kdf.memory_kib, 102_400);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = ChatConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "router_addr = \"127.0.0.1:7000\"\nmessage_mode = \"plaintext\"\n\n[kdf]\ntime_cost = 3\n",
        )
        .unwrap();

        let config = ChatConfig::load_from(&path).unwrap();
        assert_eq!(config.router_addr, "127.0.0.1:7000");
        assert_eq!(config.message_mode, MessageMode::Plaintext);
        assert_eq!(config.kdf.time_cost, 3);
        assert_eq!(config.kdf.parallelism, 8);
        assert_eq!(config.accept_wait_secs, DEFAULT_ACCEPT_WAIT_SECS);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut config = ChatConfig::default();
        config.accept_wait_secs = 5;
        config
            .session
            .options
            .insert("inbound.length".to_string(), "2".to_string());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = ChatConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "accept_wait_secs = \"soon\"").unwrap();

        assert!(matches!(
            ChatConfig::load_from(&path),
            Err(ChatError::TomlParse(_))
        ));
    }

    #[test]
    fn test_zero_poll_interval_clamped() {
        let config = ChatConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
