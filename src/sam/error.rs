//! Control-protocol error types.

use std::time::Duration;

use thiserror::Error;

use crate::sam::ControlState;

/// Errors that can occur while talking to the router's control port.
#[derive(Error, Debug)]
pub enum ControlError {
    /// HELLO reply was missing or not `RESULT=OK`.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed or unsuccessful reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No inbound peer within the accept budget.
    #[error("Timed out after {0:?} waiting for an inbound connection")]
    Timeout(Duration),

    /// Operation called in the wrong state. Rejected without network I/O.
    #[error("{operation} requires state {required}, client is {actual}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the operation needs.
        required: ControlState,
        /// State the client was in.
        actual: ControlState,
    },

    /// Stream operation used a token the session was not bound with.
    #[error("Session token mismatch: bound to {bound}, got {requested}")]
    TokenMismatch {
        /// Token from `SESSION CREATE`.
        bound: String,
        /// Token passed to the stream operation.
        requested: String,
    },

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
