//! Host and join commands.
//!
//! Both unlock the private key before contacting the router, so a wrong
//! passphrase fails fast without creating a session.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::io::BufReader;
use tracing::warn;

use argonchat::chat::{
    create_room, join_room, ChatConfig, ChatError, ChatSession, CloseReason, MessageCipher, Room,
};
use argonchat::crypto::vault;
use argonchat::crypto::{EncryptionEngine, X25519Engine};
use argonchat::keychain::KeyKind;
use argonchat::sam::DataStream;

use super::{prompt_passphrase, CommandExecutor, KeychainArgs};

/// Options shared by `host` and `join`.
#[derive(Args, Debug, Clone)]
pub struct RoomArgs {
    /// Peer's public key (alias, id or path)
    #[arg(short, long)]
    pub peer: Option<String>,

    /// Your private key (alias, id or path; default: main)
    #[arg(short, long)]
    pub key: Option<String>,

    /// Router control port (overrides settings.toml)
    #[arg(long)]
    pub router: Option<String>,

    /// Settings file (default: <config dir>/argonchat/settings.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub keychain: KeychainArgs,
}

impl RoomArgs {
    fn load_config(&self) -> Result<ChatConfig> {
        let mut config = match &self.config {
            Some(path) => ChatConfig::load_from(path),
            None => ChatConfig::load(),
        }
        .context("Failed to load settings")?;

        if let Some(router) = &self.router {
            config.router_addr = router.clone();
        }
        Ok(config)
    }

    /// Builds the payload cipher, prompting for the passphrase once.
    fn prepare_cipher(&self, config: &ChatConfig) -> Result<MessageCipher<X25519Engine>> {
        if !config.is_encrypted() {
            eprintln!("WARNING: plaintext mode. Messages are not end-to-end encrypted.");
            return Ok(MessageCipher::Plaintext);
        }

        let Some(peer) = self.peer.as_deref() else {
            bail!("--peer is required in encrypted mode");
        };

        let engine = X25519Engine;
        let keychain = self.keychain.open()?;

        let peer_path = keychain.resolve(KeyKind::Public, Some(peer))?;
        let peer_armor = fs::read_to_string(&peer_path)
            .with_context(|| format!("Failed to read {}", peer_path.display()))?;
        let remote = engine
            .parse_public_key(&peer_armor)
            .with_context(|| format!("Invalid public key in {}", peer_path.display()))?;

        let key_path = keychain.resolve(KeyKind::Private, self.key.as_deref())?;
        let passphrase = prompt_passphrase("Passphrase: ")?;
        let material = vault::unlock_file(&key_path, &passphrase, &config.kdf)
            .map_err(ChatError::from)
            .with_context(|| format!("Cannot unlock {}", key_path.display()))?;
        let armored = material.expose_str().ok_or(ChatError::InvalidKeyMaterial)?;
        let secret = engine.parse_secret_key(armored)?;

        Ok(MessageCipher::encrypted(engine, secret, remote))
    }
}

/// Host a room and wait for one peer.
#[derive(Args, Debug)]
pub struct HostCommand {
    #[command(flatten)]
    pub room: RoomArgs,

    /// Seconds to wait for the peer (overrides settings.toml)
    #[arg(short, long)]
    pub wait: Option<u64>,
}

impl CommandExecutor for HostCommand {
    fn execute(&self) -> Result<()> {
        let mut config = self.room.load_config()?;
        if let Some(wait) = self.wait {
            config.accept_wait_secs = wait;
        }
        let cipher = self.room.prepare_cipher(&config)?;

        block_on(async {
            println!("Creating room via {} ...", config.router_addr);
            let (room, stream) = create_room(&config, |destination| {
                println!();
                println!("Room ready. Share this destination with your peer:");
                println!();
                println!("{}", destination);
                println!();
                println!("Waiting up to {}s for a peer...", config.accept_wait_secs);
            })
            .await
            .context("Failed to host room")?;

            chat(room, stream, cipher).await
        })
    }
}

/// Join a room hosted at a destination.
#[derive(Args, Debug)]
pub struct JoinCommand {
    #[command(flatten)]
    pub room: RoomArgs,

    /// Host's public destination (prompted if omitted)
    #[arg(short, long)]
    pub destination: Option<String>,
}

impl CommandExecutor for JoinCommand {
    fn execute(&self) -> Result<()> {
        let config = self.room.load_config()?;
        let cipher = self.room.prepare_cipher(&config)?;

        let destination = match &self.destination {
            Some(destination) => destination.clone(),
            None => read_destination()?,
        };

        block_on(async {
            println!("Joining room via {} ...", config.router_addr);
            let (room, stream) = join_room(&config, &destination)
                .await
                .context("Failed to join room")?;

            chat(room, stream, cipher).await
        })
    }
}

/// Runs `future` on a fresh runtime.
///
/// The runtime is shut down without waiting, since the blocking stdin reader
/// may still be parked on a read.
fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let result = rt.block_on(future);
    rt.shutdown_background();
    result
}

async fn chat(room: Room, stream: DataStream, cipher: MessageCipher<X25519Engine>) -> Result<()> {
    println!("Connected. Type a message and press Enter. Ctrl+C to leave.");
    println!();

    let mut session = ChatSession::new(stream, cipher);
    let input = BufReader::new(tokio::io::stdin());
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let reason = session
        .run(input, interrupt, |event| println!("{}", event))
        .await
        .context("Chat session failed")?;

    if let Err(e) = room.close().await {
        warn!(error = %e, "failed to close room");
    }

    match reason {
        CloseReason::EndOfInput | CloseReason::Interrupted => println!("* chat closed"),
        CloseReason::PeerDisconnected => {}
        CloseReason::SendFailed(reason) => eprintln!("* send failed: {}", reason),
        CloseReason::InputFailed(reason) => eprintln!("* input error: {}", reason),
    }
    Ok(())
}

fn read_destination() -> Result<String> {
    print!("Host destination: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read destination")?;

    let destination = line.trim().to_string();
    if destination.is_empty() {
        bail!("No destination given");
    }
    Ok(destination)
}
