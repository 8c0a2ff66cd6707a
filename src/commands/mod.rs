//! Command module - Strategy pattern for CLI commands.
//!
//! Each command is a separate module implementing the `CommandExecutor` trait.

mod keygen;
mod keys;
mod protect;
mod room;

pub use keygen::KeygenCommand;
pub use keys::KeysCommand;
pub use protect::ProtectCommand;
pub use room::{HostCommand, JoinCommand};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use zeroize::Zeroizing;

use argonchat::keychain::Keychain;

/// Trait for command execution - Strategy pattern.
///
/// Each command struct holds its parsed arguments and implements
/// this trait to define its execution logic.
pub trait CommandExecutor {
    /// Executes the command with its parsed arguments.
    fn execute(&self) -> Result<()>;
}

/// Keychain location shared by commands that touch keys.
#[derive(Args, Debug, Clone, Default)]
pub struct KeychainArgs {
    /// Keychain directory (default: <data dir>/argonchat)
    #[arg(long, env = "ARGONCHAT_KEYCHAIN")]
    pub keychain: Option<PathBuf>,
}

impl KeychainArgs {
    /// Opens the keychain and registers any new key files.
    pub fn open(&self) -> Result<Keychain> {
        let mut keychain = match &self.keychain {
            Some(root) => Keychain::open(root),
            None => Keychain::open_default(),
        }
        .context("Failed to open keychain")?;

        if keychain.sync().context("Failed to scan keychain")? > 0 {
            keychain.save().context("Failed to save keychain")?;
        }
        Ok(keychain)
    }
}

/// Prompt for a passphrase (input hidden).
fn prompt_passphrase(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("Failed to read passphrase")
}

/// Prompt for a new passphrase twice.
fn prompt_new_passphrase() -> Result<Zeroizing<String>> {
    let first = prompt_passphrase("New passphrase: ")?;
    if first.is_empty() {
        bail!("Passphrase must not be empty");
    }
    let second = prompt_passphrase("Repeat passphrase: ")?;
    if *first != *second {
        bail!("Passphrases do not match");
    }
    Ok(first)
}
