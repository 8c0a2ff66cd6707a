//! Hosting and joining a two-party room.
//!
//! A room owns the control socket that created its session. The router keeps
//! the session alive only while that socket is open, so the room must outlive
//! the chat and is closed explicitly afterwards.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

use crate::chat::config::ChatConfig;
use crate::chat::error::ChatError;
use crate::sam::{ControlClient, DataStream, Destination};

/// Length of the random part of a session token.
const TOKEN_SUFFIX_LEN: usize = 6;

/// Which side of the room we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRole {
    Host,
    Guest,
}

impl RoomRole {
    fn token_prefix(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "client",
        }
    }
}

/// Generates a session token such as `host_x7Gk2Q`.
pub fn session_token(role: RoomRole) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}_{}", role.token_prefix(), suffix)
}

/// A bound router session.
#[derive(Debug)]
pub struct Room {
    token: String,
    destination: Destination,
    control: ControlClient,
}

impl Room {
    /// Handshakes, mints a destination and binds a session for `role`.
    pub async fn open(config: &ChatConfig, role: RoomRole) -> Result<Self, ChatError> {
        let mut control = ControlClient::connect(&config.router_addr).await?;
        control.handshake().await?;
        let destination = control
            .generate_destination(config.session.signature_type)
            .await?;

        let token = session_token(role);
        control
            .create_session(&token, &destination, &config.session)
            .await?;
        info!(token = %token, ?role, "room ready");

        Ok(Self {
            token,
            destination,
            control,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Public destination to share with the peer.
    pub fn public_destination(&self) -> &str {
        self.destination.public()
    }

    /// Waits for the peer within the configured budget.
    pub async fn accept(&self, config: &ChatConfig) -> Result<DataStream, ChatError> {
        let channel = self.control.open_stream_channel().await?;
        let stream = channel
            .accept_stream(&self.token, config.accept_wait(), config.poll_interval())
            .await?;
        Ok(stream)
    }

    /// Connects to the host at `remote`.
    pub async fn connect(&self, remote: &str) -> Result<DataStream, ChatError> {
        let channel = self.control.open_stream_channel().await?;
        let stream = channel.connect_stream(&self.token, remote).await?;
        Ok(stream)
    }

    /// Tears the session down by closing its control socket.
    pub async fn close(self) -> Result<(), ChatError> {
        info!(token = %self.token, "closing room");
        self.control.close().await?;
        Ok(())
    }
}

/// Hosts a room: binds a session, hands the public destination to `announce`,
/// then waits for one peer.
pub async fn create_room<F>(config: &ChatConfig, announce: F) -> Result<(Room, DataStream), ChatError>
where
    F: FnOnce(&str),
{
    let room = Room::open(config, RoomRole::Host).await?;
    announce(room.public_destination());
    let stream = room.accept(config).await?;
    Ok((room, stream))
}

/// Joins the room hosted at `remote`.
pub async fn join_room(config: &ChatConfig, remote: &str) -> Result<(Room, DataStream), ChatError> {
    let room = Room::open(config, RoomRole::Guest).await?;
    let stream = room.connect(remote).await?;
    Ok((room, stream))
}
