//! Keychain management command.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use argonchat::keychain::{KeyEntry, KeyKind};

use super::{CommandExecutor, KeychainArgs};

/// Manage the key registry.
#[derive(Args, Debug)]
pub struct KeysCommand {
    #[command(subcommand)]
    pub action: KeysAction,

    #[command(flatten)]
    pub keychain: KeychainArgs,
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// List registered keys
    List,

    /// Bind an alias to a key (one private and one public key per alias)
    Bind {
        /// Key id
        id: u32,
        /// Alias (`main` is used by default when chatting)
        alias: String,
    },

    /// Remove a key from the registry
    Remove {
        /// Key id
        id: u32,
        /// Also delete the key file
        #[arg(long)]
        delete_file: bool,
    },
}

impl CommandExecutor for KeysCommand {
    fn execute(&self) -> Result<()> {
        let mut keychain = self.keychain.open()?;

        match &self.action {
            KeysAction::List => {
                let entries = keychain.entries();
                if entries.is_empty() {
                    println!("No keys registered.");
                    println!();
                    println!("Generate one with:");
                    println!("  argonchat keygen --alias main");
                    return Ok(());
                }

                for kind in [KeyKind::Private, KeyKind::Public] {
                    println!("{} keys:", kind);
                    for entry in entries.iter().filter(|e| e.kind == kind) {
                        println!("  {}", describe(entry));
                    }
                    println!();
                }
            }
            KeysAction::Bind { id, alias } => {
                keychain.bind_alias(*id, alias)?;
                keychain.save().context("Failed to save keychain")?;
                println!("Key {} bound to alias '{}'.", id, alias);
            }
            KeysAction::Remove { id, delete_file } => {
                let entry = keychain.remove(*id, *delete_file)?;
                keychain.save().context("Failed to save keychain")?;
                if *delete_file {
                    println!("Key {} deleted ({}).", id, entry.filename);
                } else {
                    println!("Key {} removed from the registry, file kept.", id);
                }
            }
        }
        Ok(())
    }
}

fn describe(entry: &KeyEntry) -> String {
    format!(
        "[{}] {} - {}",
        entry.id,
        entry.alias.as_deref().unwrap_or("(no alias)"),
        entry.filename
    )
}
