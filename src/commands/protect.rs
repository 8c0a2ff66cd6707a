//! Wrap an existing armored private key into the vault format.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use zeroize::Zeroizing;

use argonchat::chat::ChatConfig;
use argonchat::crypto::keys::decode_secret_key;
use argonchat::crypto::vault;
use argonchat::keychain::KeyKind;

use super::{prompt_new_passphrase, CommandExecutor, KeychainArgs};

/// Protect an armored private key file with a passphrase.
#[derive(Args, Debug)]
pub struct ProtectCommand {
    /// Armored private key file to import
    pub input: PathBuf,

    /// File name stem inside the keychain (default: input file stem)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Alias to bind the key to
    #[arg(short, long)]
    pub alias: Option<String>,

    /// Delete the unprotected input file afterwards
    #[arg(long)]
    pub remove_input: bool,

    #[command(flatten)]
    pub keychain: KeychainArgs,
}

impl CommandExecutor for ProtectCommand {
    fn execute(&self) -> Result<()> {
        let config = ChatConfig::load().context("Failed to load settings")?;
        let mut keychain = self.keychain.open()?;

        let armored = Zeroizing::new(
            fs::read_to_string(&self.input)
                .with_context(|| format!("Failed to read {}", self.input.display()))?,
        );
        decode_secret_key(&armored).context("Input is not an armored private key")?;

        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .context("Cannot derive a key name from the input path")?,
        };
        let filename = format!("{}.{}", name, KeyKind::Private.extension());
        let output = keychain.dir(KeyKind::Private).join(&filename);
        if output.exists() {
            bail!("{} already exists", output.display());
        }

        let passphrase = prompt_new_passphrase()?;
        let blob = vault::protect(armored.as_bytes(), &passphrase, &config.kdf)
            .context("Failed to protect private key")?;
        blob.save(&output).context("Failed to write protected key")?;

        let id = keychain.add(KeyKind::Private, &filename);
        if let Some(alias) = &self.alias {
            keychain.bind_alias(id, alias)?;
        }
        keychain.save().context("Failed to save keychain")?;

        if self.remove_input {
            fs::remove_file(&self.input)
                .with_context(|| format!("Failed to remove {}", self.input.display()))?;
        }

        println!("[{}] Protected key written to {}", id, output.display());
        Ok(())
    }
}
