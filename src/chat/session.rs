//! Live duplex chat over a connected data stream.
//!
//! A session runs two tasks. The receive task is spawned and detached: it reads
//! frames, opens them and forwards [`ChatEvent`]s over an unbounded channel.
//! The send loop runs in the caller's task and multiplexes user input, those
//! events and an interrupt signal. When the send loop stops for any reason it
//! shuts the socket down in both directions, which ends the receive task.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Local};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::chat::codec::{CodecError, MessageCipher, Opened};
use crate::chat::frame::{read_frame, write_frame};
use crate::crypto::engine::EncryptionEngine;
use crate::sam::{DataReader, DataStream};

/// Lifecycle of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Establishing,
    Active,
    Closing,
    Closed,
}

/// Something the receive side wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// First frame arrived: the peer is on the line.
    PeerConnected,
    /// A message from the peer.
    Message {
        text: String,
        received_at: DateTime<Local>,
    },
    /// One frame could not be decrypted. The session continues.
    MessageFailed { reason: String },
    /// The stream ended or failed.
    Disconnected { reason: Option<String> },
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerConnected => write!(f, "* peer connected"),
            Self::Message { text, received_at } => {
                write!(f, "[{}] peer: {}", received_at.format("%H:%M:%S"), text)
            }
            Self::MessageFailed { reason } => write!(f, "* could not decrypt a message: {}", reason),
            Self::Disconnected { reason: None } => write!(f, "* peer disconnected"),
            Self::Disconnected {
                reason: Some(reason),
            } => write!(f, "* connection lost: {}", reason),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Input reached end of file.
    EndOfInput,
    /// The user interrupted.
    Interrupted,
    /// The receive side saw the stream end.
    PeerDisconnected,
    /// Writing a frame failed.
    SendFailed(String),
    /// Reading user input failed.
    InputFailed(String),
}

/// Turns opened frames into events.
///
/// A peer that does not send a presence frame starts with an encrypted frame
/// we may not be able to read, e.g. after a key mismatch or a router banner.
/// A failure on the very first frame is therefore reported as a connection
/// rather than a lost message.
#[derive(Debug, Default)]
pub struct ReceivePolicy {
    frames_seen: u64,
}

impl ReceivePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies the result of opening one frame.
    pub fn classify(&mut self, opened: Result<Opened, CodecError>) -> Option<ChatEvent> {
        let first = self.frames_seen == 0;
        self.frames_seen += 1;

        match opened {
            Ok(Opened::Empty) if first => Some(ChatEvent::PeerConnected),
            Ok(Opened::Empty) => None,
            Ok(Opened::Plaintext(bytes)) => {
                let message = ChatEvent::Message {
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                    received_at: Local::now(),
                };
                Some(message)
            }
            Err(e) if first => {
                debug!(error = %e, "first frame unreadable, treating as presence");
                Some(ChatEvent::PeerConnected)
            }
            Err(e) => Some(ChatEvent::MessageFailed {
                reason: e.to_string(),
            }),
        }
    }

    /// Frames classified so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

/// A chat over one data stream.
pub struct ChatSession<E: EncryptionEngine> {
    state: SessionState,
    stream: Option<DataStream>,
    cipher: MessageCipher<E>,
}

impl<E: EncryptionEngine> ChatSession<E> {
    /// Creates a session in the `Establishing` state.
    ///
    /// Key material is already unlocked and parsed into `cipher`, so a wrong
    /// passphrase never reaches this point.
    pub fn new(stream: DataStream, cipher: MessageCipher<E>) -> Self {
        Self {
            state: SessionState::Establishing,
            stream: Some(stream),
            cipher,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the chat until input ends, the peer goes away or `interrupt` fires.
    ///
    /// Each input line is sent as one message; blank lines are skipped. Every
    /// event from the receive task is passed to `on_event`.
    pub async fn run<I, S, F>(
        &mut self,
        input: I,
        interrupt: S,
        mut on_event: F,
    ) -> Result<CloseReason, CodecError>
    where
        I: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
        F: FnMut(&ChatEvent),
    {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                return Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "session already ran",
                )))
            }
        };

        self.state = SessionState::Active;
        let (reader, mut writer) = stream.into_split();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        tokio::spawn(receive_loop(reader, self.cipher.clone(), events_tx));

        let mut lines = input.lines();
        tokio::pin!(interrupt);

        let reason = match write_frame(writer.get_mut(), &[]).await {
            Err(e) => CloseReason::SendFailed(e.to_string()),
            Ok(()) => loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let text = line.trim_end_matches(['\r', '\n']);
                            if text.trim().is_empty() {
                                continue;
                            }
                            let sent = match self.cipher.seal_text(text) {
                                Ok(payload) => write_frame(writer.get_mut(), &payload).await,
                                Err(e) => Err(e),
                            };
                            if let Err(e) = sent {
                                warn!(error = %e, "send failed");
                                break CloseReason::SendFailed(e.to_string());
                            }
                        }
                        Ok(None) => break CloseReason::EndOfInput,
                        Err(e) => break CloseReason::InputFailed(e.to_string()),
                    },
                    event = events_rx.recv() => match event {
                        Some(event) => {
                            let disconnected = matches!(event, ChatEvent::Disconnected { .. });
                            on_event(&event);
                            if disconnected {
                                break CloseReason::PeerDisconnected;
                            }
                        }
                        None => break CloseReason::PeerDisconnected,
                    },
                    _ = &mut interrupt => break CloseReason::Interrupted,
                }
            },
        };

        self.state = SessionState::Closing;
        info!(?reason, "closing chat session");
        if let Err(e) = writer.shutdown() {
            debug!(error = %e, "socket already closed");
        }
        self.state = SessionState::Closed;
        Ok(reason)
    }
}

async fn receive_loop<E: EncryptionEngine>(
    mut reader: DataReader,
    cipher: MessageCipher<E>,
    events: UnboundedSender<ChatEvent>,
) {
    let mut policy = ReceivePolicy::new();
    loop {
        let event = match read_frame(&mut reader).await {
            Ok(Some(payload)) => match policy.classify(cipher.open(&payload)) {
                Some(event) => event,
                None => continue,
            },
            Ok(None) => ChatEvent::Disconnected { reason: None },
            Err(e) => ChatEvent::Disconnected {
                reason: Some(e.to_string()),
            },
        };

        let done = matches!(event, ChatEvent::Disconnected { .. });
        if events.send(event).is_err() || done {
            break;
        }
    }
    debug!(frames = policy.frames_seen(), "receive task finished");
}
