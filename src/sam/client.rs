//! Control-port client.
//!
//! Every call writes one command line and reads one reply line. The client
//! tracks where it is in the setup sequence and rejects out-of-order calls
//! before touching the socket.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::sam::error::ControlError;
use crate::sam::reply::Reply;
use crate::sam::stream::DataStream;
use crate::sam::{ControlState, Destination, SessionOptions};

/// Protocol versions offered in HELLO.
const HELLO_COMMAND: &str = "HELLO VERSION MIN=3.1 MAX=3.3";

/// Upper bound for a single reply line. Private destinations are under 1 KiB.
const MAX_LINE_LEN: usize = 64 * 1024;

/// A connection to the router's control port.
#[derive(Debug)]
pub struct ControlClient {
    stream: TcpStream,
    addr: String,
    buffer: Vec<u8>,
    state: ControlState,
    token: Option<String>,
}

impl ControlClient {
    /// Opens a TCP connection to the control port.
    pub async fn connect(addr: &str) -> Result<Self, ControlError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(addr, "connected to control port");
        Ok(Self {
            stream,
            addr: addr.to_string(),
            buffer: Vec::new(),
            state: ControlState::New,
            token: None,
        })
    }

    /// Current protocol state.
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Token this client is bound to, once a session exists.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Negotiates the protocol version.
    pub async fn handshake(&mut self) -> Result<(), ControlError> {
        self.require("handshake", ControlState::New)?;

        let line = match self.exchange(HELLO_COMMAND).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                return Err(self.fail(ControlError::Handshake(
                    "router closed the connection".to_string(),
                )))
            }
            Err(e) => return Err(self.fail(ControlError::Handshake(e.to_string()))),
        };

        let reply = match Reply::parse(&line) {
            Ok(reply) => reply,
            Err(_) => return Err(self.fail(ControlError::Handshake(line))),
        };
        if !reply.is("HELLO", "REPLY") || reply.result() != Some("OK") {
            return Err(self.fail(ControlError::Handshake(reply.describe())));
        }

        debug!(version = reply.get("VERSION"), "handshake complete");
        self.state = ControlState::Handshaken;
        Ok(())
    }

    /// Asks the router for a fresh destination.
    pub async fn generate_destination(
        &mut self,
        signature_type: u16,
    ) -> Result<Destination, ControlError> {
        self.require("generate_destination", ControlState::Handshaken)?;

        let command = format!("DEST GENERATE SIGNATURE_TYPE={}", signature_type);
        let reply = match self.request(&command).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e)),
        };

        if !reply.is("DEST", "REPLY") {
            return Err(self.fail(ControlError::Protocol(format!(
                "expected DEST REPLY, got: {}",
                reply.describe()
            ))));
        }
        if let Some(result) = reply.result() {
            if result != "OK" {
                return Err(self.fail(ControlError::Protocol(format!(
                    "DEST GENERATE failed: {}",
                    reply.describe()
                ))));
            }
        }

        let (public, private) = match (reply.get("PUB"), reply.get("PRIV")) {
            (Some(public), Some(private)) if !public.is_empty() && !private.is_empty() => {
                (public.to_string(), private.to_string())
            }
            _ => {
                return Err(self.fail(ControlError::Protocol(
                    "DEST REPLY is missing PUB or PRIV".to_string(),
                )))
            }
        };

        self.state = ControlState::DestReady;
        Ok(Destination::new(public, private))
    }

    /// Binds a STREAM session to `token` using `destination`.
    ///
    /// This socket must stay open for as long as the session is used.
    pub async fn create_session(
        &mut self,
        token: &str,
        destination: &Destination,
        options: &SessionOptions,
    ) -> Result<(), ControlError> {
        self.require("create_session", ControlState::DestReady)?;

        let command = format!(
            "SESSION CREATE STYLE=STREAM ID={} DESTINATION={}{}",
            token,
            destination.private(),
            options.to_command_suffix()
        );
        let result = match self.request(&command).await {
            Ok(reply) => reply.expect_ok("SESSION", "STATUS"),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            return Err(self.fail(e));
        }

        info!(token, "session created");
        self.token = Some(token.to_string());
        self.state = ControlState::SessionBound;
        Ok(())
    }

    /// Opens a second handshaken control socket bound to the same token.
    pub async fn open_stream_channel(&self) -> Result<ControlClient, ControlError> {
        self.require("open_stream_channel", ControlState::SessionBound)?;

        let mut channel = ControlClient::connect(&self.addr).await?;
        channel.handshake().await?;
        channel.token = self.token.clone();
        channel.state = ControlState::SessionBound;
        Ok(channel)
    }

    /// Connects to `remote` and turns this socket into the data stream.
    pub async fn connect_stream(
        mut self,
        token: &str,
        remote: &str,
    ) -> Result<DataStream, ControlError> {
        self.check_stream_call("connect_stream", token)?;

        self.state = ControlState::StreamPending;
        let command = format!("STREAM CONNECT ID={} DESTINATION={}", token, remote);
        let reply = match self.request(&command).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = reply.expect_ok("STREAM", "STATUS") {
            return Err(self.fail(e));
        }

        info!(token, "stream connected");
        self.state = ControlState::StreamEstablished;
        Ok(DataStream::new(
            self.stream,
            self.buffer,
            Some(remote.to_string()),
        ))
    }

    /// Waits up to `wait` for an inbound peer, checking every `poll`.
    ///
    /// On timeout the control socket is dropped, which releases the listener
    /// on the router side.
    pub async fn accept_stream(
        mut self,
        token: &str,
        wait: Duration,
        poll: Duration,
    ) -> Result<DataStream, ControlError> {
        self.check_stream_call("accept_stream", token)?;

        self.state = ControlState::StreamPending;
        let command = format!("STREAM ACCEPT ID={}", token);
        if let Err(e) = self.send(&command).await {
            return Err(self.fail(e));
        }

        let deadline = Instant::now() + wait;
        let line = match self.read_line_until(deadline, poll).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(token, ?wait, "no inbound connection");
                return Err(self.fail(ControlError::Timeout(wait)));
            }
            Err(e) => return Err(self.fail(e)),
        };
        let status = Reply::parse(&line).and_then(|r| r.expect_ok("STREAM", "STATUS"));
        if let Err(e) = status {
            return Err(self.fail(e));
        }

        // The status arrives once the listener is registered. The peer is
        // announced with one more line when it actually connects.
        let peer = match self.read_line_until(deadline, poll).await {
            Ok(Some(line)) => line.split_whitespace().next().map(str::to_string),
            Ok(None) => {
                info!(token, ?wait, "no inbound connection");
                return Err(self.fail(ControlError::Timeout(wait)));
            }
            Err(e) => return Err(self.fail(e)),
        };

        info!(token, "inbound stream accepted");
        self.state = ControlState::StreamEstablished;
        Ok(DataStream::new(self.stream, self.buffer, peer))
    }

    /// Closes the control socket, releasing any session bound to it.
    pub async fn close(mut self) -> Result<(), ControlError> {
        self.state = ControlState::Closed;
        self.stream.shutdown().await?;
        debug!(token = self.token.as_deref(), "control socket closed");
        Ok(())
    }

    fn require(&self, operation: &'static str, required: ControlState) -> Result<(), ControlError> {
        if self.state != required {
            return Err(ControlError::InvalidState {
                operation,
                required,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn check_stream_call(&self, operation: &'static str, token: &str) -> Result<(), ControlError> {
        self.require(operation, ControlState::SessionBound)?;
        match self.token.as_deref() {
            Some(bound) if bound == token => Ok(()),
            bound => Err(ControlError::TokenMismatch {
                bound: bound.unwrap_or_default().to_string(),
                requested: token.to_string(),
            }),
        }
    }

    fn fail(&mut self, error: ControlError) -> ControlError {
        self.state = ControlState::Closed;
        error
    }

    async fn send(&mut self, command: &str) -> Result<(), ControlError> {
        debug!(command = %redact(command), "control >");
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn exchange(&mut self, command: &str) -> Result<Option<String>, ControlError> {
        self.send(command).await?;
        self.read_line().await
    }

    async fn request(&mut self, command: &str) -> Result<Reply, ControlError> {
        match self.exchange(command).await? {
            Some(line) => Reply::parse(&line),
            None => Err(ControlError::Protocol(
                "router closed the connection".to_string(),
            )),
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>, ControlError> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Like `read_line`, but gives up at `deadline` and returns `None`.
    async fn read_line_until(
        &mut self,
        deadline: Instant,
        poll: Duration,
    ) -> Result<Option<String>, ControlError> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match tokio::time::timeout(poll.min(remaining), self.fill()).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    return Err(ControlError::Protocol(
                        "router closed the connection".to_string(),
                    ))
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => debug!(?remaining, "still waiting for a peer"),
            }
        }
    }

    /// Reads more bytes into the buffer. Returns false on EOF.
    async fn fill(&mut self) -> Result<bool, ControlError> {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n > 0)
    }

    fn take_line(&mut self) -> Result<Option<String>, ControlError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = String::from_utf8(raw)
                    .map_err(|_| ControlError::Protocol("reply is not UTF-8".to_string()))?;
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                debug!(reply = %redact(&line), "control <");
                Ok(Some(line))
            }
            None if self.buffer.len() > MAX_LINE_LEN => {
                Err(ControlError::Protocol("reply line too long".to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Hides destination and private-key values in logged lines.
fn redact(line: &str) -> String {
    line.split(' ')
        .map(|word| match word.split_once('=') {
            Some((key @ ("DESTINATION" | "PRIV"), _)) => format!("{}=<redacted>", key),
            _ => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
