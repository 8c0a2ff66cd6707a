//! # argonchat - anonymous encrypted chat over I2P
//!
//! argonchat connects two people through a local I2P router. The router hides
//! who is talking to whom; argonchat adds end-to-end encryption on top.
//!
//! ## Overview
//!
//! - The host asks the router's SAM bridge for a fresh destination, binds a
//!   session to it and waits for one inbound stream
//! - The guest binds its own session and connects to the host's destination
//! - Each message is encrypted to the peer's X25519 public key and sent as a
//!   length-prefixed frame
//! - The private key lives on disk encrypted under a passphrase
//!   (Argon2i + AES-256-GCM) and is unlocked once per chat
//!
//! ## Security Model
//!
//! - **Destinations are ephemeral**: minted per room, never stored
//! - **Keys are zeroized** when dropped, passphrases too
//! - **No history**: messages only exist on screen
//!
//! ## Example Usage
//!
//! ```rust
//! use argonchat::chat::SecureCodec;
//! use argonchat::crypto::{KeyPair, X25519Engine};
//! use argonchat::chat::Opened;
//!
//! let bob = KeyPair::generate();
//! let codec = SecureCodec::new(X25519Engine);
//!
//! let frame = codec.seal(b"hello", bob.public_key()).unwrap();
//! let opened = codec.open(&frame, bob.secret_key()).unwrap();
//! assert_eq!(opened, Opened::Plaintext(b"hello".to_vec()));
//! ```
//!
//! ## Modules
//!
//! - [`sam`]: SAM v3 control-port client
//! - [`crypto`]: keys, message encryption and the key vault
//! - [`chat`]: framing, codec, rooms and the live session
//! - [`keychain`]: alias-based key registry

pub mod chat;
pub mod crypto;
pub mod keychain;
pub mod sam;

pub use chat::{ChatConfig, ChatError, ChatSession};
pub use crypto::{EncryptionEngine, KeyPair, X25519Engine};
pub use sam::{ControlClient, ControlError};
