//! argonchat - anonymous two-party encrypted chat over I2P
//!
//! Talks to a local router's SAM bridge, protects the private key with
//! Argon2 + AES-GCM, and encrypts every message to the peer's public key.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{
    CommandExecutor, HostCommand, JoinCommand, KeygenCommand, KeysCommand, ProtectCommand,
};

/// argonchat - anonymous encrypted chat over I2P
///
/// Requires a running I2P router with the SAM bridge enabled (default 127.0.0.1:7656).
#[derive(Parser)]
#[command(name = "argonchat")]
#[command(version)]
#[command(about = "Anonymous two-party encrypted chat over an I2P router")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair into the keychain
    Keygen(KeygenCommand),

    /// Protect an existing armored private key with a passphrase
    Protect(ProtectCommand),

    /// List and manage registered keys
    Keys(KeysCommand),

    /// Host a chat room and wait for a peer
    Host(HostCommand),

    /// Join a chat room by its destination
    Join(JoinCommand),
}

impl Commands {
    fn executor(&self) -> &dyn CommandExecutor {
        match self {
            Self::Keygen(cmd) => cmd,
            Self::Protect(cmd) => cmd,
            Self::Keys(cmd) => cmd,
            Self::Host(cmd) => cmd,
            Self::Join(cmd) => cmd,
        }
    }
}

/// Logs go to stderr so they don't interleave with the chat on stdout.
/// Level is controlled by `RUST_LOG`; defaults to `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cli.command.executor().execute()
}
