//! Client for the router's SAM v3 control port.
//!
//! The setup sequence is line-oriented:
//!
//! ```text
//! HELLO VERSION MIN=3.1 MAX=3.3          -> HELLO REPLY RESULT=OK
//! DEST GENERATE SIGNATURE_TYPE=7         -> DEST REPLY PUB=.. PRIV=..
//! SESSION CREATE STYLE=STREAM ID=t ...   -> SESSION STATUS RESULT=OK
//! STREAM CONNECT ID=t DESTINATION=..     -> STREAM STATUS RESULT=OK
//! STREAM ACCEPT ID=t                     -> STREAM STATUS RESULT=OK, then peer line
//! ```
//!
//! The socket that created the session keeps it alive. Stream commands go over
//! a second socket carrying the same token, which then becomes the data stream.

mod client;
mod error;
mod reply;
mod stream;

pub use client::ControlClient;
pub use error::ControlError;
pub use reply::Reply;
pub use stream::{DataReader, DataStream, DataWriter};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Default control port address.
pub const DEFAULT_ROUTER_ADDR: &str = "127.0.0.1:7656";

/// Ed25519 destinations.
pub const DEFAULT_SIGNATURE_TYPE: u16 = 7;

/// Where a control client is in the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    New,
    Handshaken,
    DestReady,
    SessionBound,
    StreamPending,
    StreamEstablished,
    Closed,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A router-minted destination. Never persisted.
#[derive(Clone)]
pub struct Destination {
    public: String,
    private: Zeroizing<String>,
}

impl Destination {
    pub fn new(public: String, private: String) -> Self {
        Self {
            public,
            private: Zeroizing::new(private),
        }
    }

    /// The address peers connect to.
    pub fn public(&self) -> &str {
        &self.public
    }

    pub fn private(&self) -> &str {
        &self.private
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Options sent with `DEST GENERATE` and `SESSION CREATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Destination signature type.
    pub signature_type: u16,
    /// Extra `key=value` router options, e.g. `i2cp.leaseSetEncType`.
    pub options: BTreeMap<String, String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert("i2cp.leaseSetEncType".to_string(), "4".to_string());
        Self {
            signature_type: DEFAULT_SIGNATURE_TYPE,
            options,
        }
    }
}

impl SessionOptions {
    /// Renders ` k=v ... SIGNATURE_TYPE=n` for appending to `SESSION CREATE`.
    pub fn to_command_suffix(&self) -> String {
        let mut suffix = String::new();
        for (key, value) in &self.options {
            suffix.push_str(&format!(" {}={}", key, value));
        }
        suffix.push_str(&format!(" SIGNATURE_TYPE={}", self.signature_type));
        suffix
    }
}
