//! Key generation command.

use anyhow::{bail, Context, Result};
use clap::Args;

use argonchat::chat::ChatConfig;
use argonchat::crypto::keys::save_public_key;
use argonchat::crypto::vault;
use argonchat::crypto::KeyPair;
use argonchat::keychain::{KeyKind, DEFAULT_ALIAS};

use super::{prompt_new_passphrase, CommandExecutor, KeychainArgs};

/// Generate a new key pair into the keychain.
#[derive(Args, Debug)]
pub struct KeygenCommand {
    /// File name stem (creates private/<name>.bin and public/<name>.asc)
    #[arg(short, long, default_value = DEFAULT_ALIAS)]
    pub name: String,

    /// Alias to bind both keys to (a `main` pair gets the `main` alias if it is free)
    #[arg(short, long)]
    pub alias: Option<String>,

    #[command(flatten)]
    pub keychain: KeychainArgs,
}

impl CommandExecutor for KeygenCommand {
    fn execute(&self) -> Result<()> {
        let config = ChatConfig::load().context("Failed to load settings")?;
        let mut keychain = self.keychain.open()?;

        let private_path = keychain
            .dir(KeyKind::Private)
            .join(format!("{}.{}", self.name, KeyKind::Private.extension()));
        let public_path = keychain
            .dir(KeyKind::Public)
            .join(format!("{}.{}", self.name, KeyKind::Public.extension()));
        if private_path.exists() || public_path.exists() {
            bail!("Key '{}' already exists in the keychain", self.name);
        }

        let passphrase = prompt_new_passphrase()?;
        let keypair = KeyPair::generate();

        println!("Protecting private key (this takes a moment)...");
        let blob = vault::protect(keypair.armored_secret().as_bytes(), &passphrase, &config.kdf)
            .context("Failed to protect private key")?;
        blob.save(&private_path)
            .context("Failed to write private key")?;
        save_public_key(keypair.public_key(), &public_path)
            .context("Failed to write public key")?;

        let (private_id, public_id) = keychain.add_pair(&self.name, self.alias.as_deref())?;
        keychain.save().context("Failed to save keychain")?;

        println!("Key pair generated successfully:");
        println!();
        println!("  [{}] Private key: {}", private_id, private_path.display());
        println!("  [{}] Public key:  {}", public_id, public_path.display());
        println!();
        println!("Share the public key (.asc) with the people you chat with.");
        println!("The private key is protected by your passphrase.");

        Ok(())
    }
}
