//! Integration tests for argonchat
//!
//! A small in-process SAM bridge stands in for the I2P router: it mints
//! destinations, binds sessions, and splices a `STREAM CONNECT` socket onto the
//! matching `STREAM ACCEPT` socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};

use argonchat::chat::{
    create_room, join_room, ChatConfig, ChatError, ChatEvent, ChatSession, CloseReason,
    MessageCipher, MessageMode, Opened, SecureCodec,
};
use argonchat::crypto::vault::{self, EncryptedKeyBlob, KdfParams, VaultError};
use argonchat::crypto::{EncryptionEngine, KeyPair, X25519Engine};
use argonchat::keychain::{KeyKind, Keychain};
use argonchat::sam::ControlError;

/// Cheap KDF parameters; the blob format is unchanged.
fn fast_kdf() -> KdfParams {
    KdfParams {
        time_cost: 1,
        memory_kib: 64,
        parallelism: 1,
    }
}

#[derive(Default)]
struct BridgeState {
    next_dest: u32,
    /// private destination -> public destination
    dests: HashMap<String, String>,
    /// token -> public destination
    sessions: HashMap<String, String>,
    /// public destination -> waiting acceptor
    acceptors: HashMap<String, oneshot::Sender<(TcpStream, String)>>,
}

/// Starts the bridge and returns its address.
async fn start_bridge() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = Arc::new(Mutex::new(BridgeState::default()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tokio::spawn(serve(socket, Arc::clone(&state)));
        }
    });
    addr
}

/// Reads one line without buffering past it.
async fn read_line(socket: &mut TcpStream) -> Option<String> {
    let mut line = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match socket.read(&mut byte).await {
            Ok(1) if byte[0] == b'\n' => return String::from_utf8(line).ok(),
            Ok(1) => line.push(byte[0]),
            _ => return None,
        }
    }
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace()
        .find_map(|word| word.strip_prefix(key)?.strip_prefix('='))
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<BridgeState>>) {
    while let Some(line) = read_line(&mut socket).await {
        let reply = if line.starts_with("HELLO VERSION") {
            "HELLO REPLY RESULT=OK VERSION=3.3\n".to_string()
        } else if line.starts_with("DEST GENERATE") {
            let mut state = state.lock().await;
            state.next_dest += 1;
            let public = format!("pub{}AAAA~", state.next_dest);
            let private = format!("priv{}BBBB~", state.next_dest);
            state.dests.insert(private.clone(), public.clone());
            format!("DEST REPLY PUB={} PRIV={}\n", public, private)
        } else if line.starts_with("SESSION CREATE") {
            let mut state = state.lock().await;
            let token = field(&line, "ID").unwrap_or_default().to_string();
            let private = field(&line, "DESTINATION").unwrap_or_default();
            match state.dests.get(private).cloned() {
                Some(public) if !state.sessions.contains_key(&token) => {
                    state.sessions.insert(token, public);
                    "SESSION STATUS RESULT=OK\n".to_string()
                }
                Some(_) => "SESSION STATUS RESULT=DUPLICATED_ID\n".to_string(),
                None => "SESSION STATUS RESULT=INVALID_KEY\n".to_string(),
            }
        } else if line.starts_with("STREAM ACCEPT") {
            let token = field(&line, "ID").unwrap_or_default().to_string();
            let (tx, rx) = oneshot::channel();
            {
                let mut state = state.lock().await;
                let Some(public) = state.sessions.get(&token).cloned() else {
                    let _ = socket
                        .write_all(b"STREAM STATUS RESULT=INVALID_ID\n")
                        .await;
                    return;
                };
                state.acceptors.insert(public, tx);
            }
            if socket.write_all(b"STREAM STATUS RESULT=OK\n").await.is_err() {
                return;
            }
            if let Ok((mut peer, from)) = rx.await {
                let announce = format!("{} FROM_PORT=0 TO_PORT=0\n", from);
                if socket.write_all(announce.as_bytes()).await.is_ok() {
                    let _ = tokio::io::copy_bidirectional(&mut socket, &mut peer).await;
                }
            }
            return;
        } else if line.starts_with("STREAM CONNECT") {
            let token = field(&line, "ID").unwrap_or_default().to_string();
            let target = field(&line, "DESTINATION").unwrap_or_default().to_string();
            let mut state = state.lock().await;
            let from = state.sessions.get(&token).cloned();
            match (from, state.acceptors.remove(&target)) {
                (Some(from), Some(acceptor)) => {
                    drop(state);
                    if socket.write_all(b"STREAM STATUS RESULT=OK\n").await.is_ok() {
                        let _ = acceptor.send((socket, from));
                    }
                    return;
                }
                _ => "STREAM STATUS RESULT=CANT_REACH_PEER MESSAGE=\"no listener\"\n".to_string(),
            }
        } else {
            "ERROR RESULT=I2P_ERROR\n".to_string()
        };

        if socket.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn config_for(addr: &str) -> ChatConfig {
    ChatConfig {
        router_addr: addr.to_string(),
        accept_wait_secs: 5,
        poll_interval_ms: 100,
        kdf: fast_kdf(),
        ..Default::default()
    }
}

/// Host and guest meet through the bridge and exchange encrypted messages.
#[tokio::test]
async fn test_two_peers_chat_through_router() {
    let addr = start_bridge().await;
    let config = config_for(&addr);

    let host_keys = KeyPair::generate();
    let guest_keys = KeyPair::generate();

    let (dest_tx, dest_rx) = oneshot::channel();
    let host_config = config.clone();
    let host_cipher = MessageCipher::encrypted(
        X25519Engine,
        host_keys.secret_key().clone(),
        *guest_keys.public_key(),
    );
    let host = tokio::spawn(async move {
        let (room, stream) = create_room(&host_config, |dest| {
            let _ = dest_tx.send(dest.to_string());
        })
        .await
        .unwrap();
        assert!(room.token().starts_with("host_"));
        assert!(stream.peer().unwrap().starts_with("pub"));

        let mut session = ChatSession::new(stream, host_cipher);
        let (_input, input_rx) = tokio::io::duplex(64);
        let mut events = Vec::new();
        let reason = session
            .run(BufReader::new(input_rx), std::future::pending(), |e| {
                events.push(e.clone())
            })
            .await
            .unwrap();
        room.close().await.unwrap();
        (reason, events)
    });

    let destination = dest_rx.await.unwrap();
    let (room, stream) = join_room(&config, &destination).await.unwrap();
    assert!(room.token().starts_with("client_"));

    let guest_cipher = MessageCipher::encrypted(
        X25519Engine,
        guest_keys.secret_key().clone(),
        *host_keys.public_key(),
    );
    let mut session = ChatSession::new(stream, guest_cipher);
    let (mut input, input_rx) = tokio::io::duplex(256);
    input.write_all(b"hello host\n\nsecond line\n").await.unwrap();

    // Leave shortly after the host has shown up.
    let (seen_tx, seen_rx) = oneshot::channel();
    let mut seen_tx = Some(seen_tx);
    let leave = async move {
        let _ = seen_rx.await;
        tokio::time::sleep(Duration::from_millis(300)).await;
    };
    let reason = session
        .run(BufReader::new(input_rx), leave, |e| {
            if *e == ChatEvent::PeerConnected {
                if let Some(tx) = seen_tx.take() {
                    let _ = tx.send(());
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(reason, CloseReason::Interrupted);
    room.close().await.unwrap();

    let (host_reason, host_events) = tokio::time::timeout(Duration::from_secs(10), host)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host_reason, CloseReason::PeerDisconnected);
    assert_eq!(host_events[0], ChatEvent::PeerConnected);

    let texts: Vec<&str> = host_events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Message { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, ["hello host", "second line"]);
}

/// Nobody connects: the host gives up after the wait budget.
#[tokio::test]
async fn test_host_times_out_without_peer() {
    let addr = start_bridge().await;
    let config = ChatConfig {
        accept_wait_secs: 2,
        poll_interval_ms: 1000,
        ..config_for(&addr)
    };

    let started = std::time::Instant::now();
    let result = create_room(&config, |_| {}).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(ChatError::Control(ControlError::Timeout(_)))
    ));
    assert!(elapsed >= Duration::from_millis(1900));
    assert!(elapsed < Duration::from_secs(5));
}

/// Joining a destination nobody listens on fails with the router's message.
#[tokio::test]
async fn test_join_unknown_destination() {
    let addr = start_bridge().await;
    let result = join_room(&config_for(&addr), "nobody-here").await;

    match result {
        Err(ChatError::Control(ControlError::Protocol(message))) => {
            assert!(message.contains("CANT_REACH_PEER"));
            assert!(message.contains("no listener"));
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

/// No router at all.
#[tokio::test]
async fn test_router_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = join_room(&config_for(&addr), "whatever").await;
    assert!(matches!(result, Err(ChatError::Control(ControlError::Io(_)))));
}

/// Plaintext mode needs no keys and still frames messages.
#[tokio::test]
async fn test_plaintext_mode_through_router() {
    let addr = start_bridge().await;
    let config = ChatConfig {
        message_mode: MessageMode::Plaintext,
        ..config_for(&addr)
    };
    assert!(!config.is_encrypted());

    let (dest_tx, dest_rx) = oneshot::channel();
    let host_config = config.clone();
    let host = tokio::spawn(async move {
        let (_room, stream) = create_room(&host_config, |d| {
            let _ = dest_tx.send(d.to_string());
        })
        .await
        .unwrap();
        let (mut reader, _writer) = stream.into_split();
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        received
    });

    let destination = dest_rx.await.unwrap();
    let (_room, stream) = join_room(&config, &destination).await.unwrap();
    let mut session: ChatSession<X25519Engine> = ChatSession::new(stream, MessageCipher::Plaintext);
    session
        .run(BufReader::new(&b"in the clear\n"[..]), std::future::pending(), |_| {})
        .await
        .unwrap();

    let received = host.await.unwrap();
    assert_eq!(&received[..4], &[0, 0, 0, 0]);
    assert_eq!(&received[4..8], &12u32.to_be_bytes());
    assert_eq!(&received[8..], b"in the clear");
}

/// Key generated, protected, stored in a keychain, unlocked, and used.
#[test]
fn test_vault_keychain_and_codec() {
    let dir = tempfile::tempdir().unwrap();
    let mut keychain = Keychain::open(dir.path()).unwrap();
    let engine = X25519Engine;

    let keypair = KeyPair::generate();
    let blob = vault::protect(keypair.armored_secret().as_bytes(), "correct horse", &fast_kdf())
        .unwrap();
    let key_path = keychain.dir(KeyKind::Private).join("me.bin");
    blob.save(&key_path).unwrap();
    std::fs::write(
        keychain.dir(KeyKind::Public).join("me.asc"),
        keypair.armored_public(),
    )
    .unwrap();

    assert_eq!(keychain.sync().unwrap(), 2);
    keychain.bind_alias(1001, "main").unwrap();
    keychain.bind_alias(2001, "me").unwrap();

    let resolved = keychain.resolve(KeyKind::Private, None).unwrap();
    assert_eq!(resolved, key_path);

    let material = vault::unlock_file(&resolved, "correct horse", &fast_kdf()).unwrap();
    let secret = engine
        .parse_secret_key(material.expose_str().unwrap())
        .unwrap();
    let public_armor =
        std::fs::read_to_string(keychain.resolve(KeyKind::Public, Some("me")).unwrap()).unwrap();
    let public = engine.parse_public_key(&public_armor).unwrap();

    let codec = SecureCodec::new(engine);
    let frame = codec.seal(b"note to self", &public).unwrap();
    assert_eq!(
        codec.open(&frame, &secret).unwrap(),
        Opened::Plaintext(b"note to self".to_vec())
    );

    assert!(matches!(
        vault::unlock_file(&resolved, "wrong horse", &fast_kdf()),
        Err(VaultError::AuthenticationFailed)
    ));
}

/// The persisted blob layout is salt || nonce || ciphertext+tag.
#[test]
fn test_blob_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("k.bin");

    let blob = vault::protect(b"0123456789", "pw", &fast_kdf()).unwrap();
    blob.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 16 + 12 + 10 + 16);
    assert_eq!(&bytes[..16], blob.salt());
    assert_eq!(&bytes[16..28], blob.nonce());

    let reloaded = EncryptedKeyBlob::load(&path).unwrap();
    assert_eq!(reloaded, blob);

    std::fs::write(&path, &bytes[..28]).unwrap();
    assert!(matches!(
        vault::unlock_file(&path, "pw", &fast_kdf()),
        Err(VaultError::AuthenticationFailed)
    ));
}
