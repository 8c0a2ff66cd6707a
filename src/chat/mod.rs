//! # Chat
//!
//! Two-party chat over a router data stream.
//!
//! ## Wire format
//!
//! ```text
//! [u32 big-endian length][armored ciphertext] [u32 length][...] ...
//! ```
//!
//! Each side opens with an empty frame so the other knows it is there.
//!
//! ## Security Model
//!
//! - **Private key** is unlocked once before the room is opened and wiped on drop
//! - **Messages** are encrypted to the peer's public key, one ephemeral key each
//! - **No history**: nothing is written to disk

pub mod codec;
pub mod config;
mod error;
pub mod frame;
pub mod room;
pub mod session;

pub use codec::{CodecError, MessageCipher, Opened, SecureCodec};
pub use config::{ChatConfig, MessageMode};
pub use error::ChatError;
pub use room::{create_room, join_room, Room, RoomRole};
pub use session::{ChatEvent, ChatSession, CloseReason, ReceivePolicy, SessionState};
