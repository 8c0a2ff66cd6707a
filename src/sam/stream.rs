//! Connected data stream handed out by the control client.
//!
//! Once `STREAM CONNECT` or `STREAM ACCEPT` succeeds, the control socket carries
//! raw peer bytes. Anything the client already buffered past the status line
//! belongs to the peer and is replayed ahead of the socket.

use std::io::Cursor;
use std::net::Shutdown;

use socket2::SockRef;
use tokio::io::{AsyncReadExt, Chain};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Read half of a data stream, including bytes buffered during setup.
pub type DataReader = Chain<Cursor<Vec<u8>>, OwnedReadHalf>;

/// A connected peer-to-peer byte stream.
#[derive(Debug)]
pub struct DataStream {
    stream: TcpStream,
    pending: Vec<u8>,
    peer: Option<String>,
}

impl DataStream {
    /// Wraps an already-connected socket.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
            peer: None,
        }
    }

    pub(crate) fn new(stream: TcpStream, pending: Vec<u8>, peer: Option<String>) -> Self {
        Self {
            stream,
            pending,
            peer,
        }
    }

    /// Destination of the remote peer, when the router reported it.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (DataReader, DataWriter) {
        let (read_half, write_half) = self.stream.into_split();
        let reader = Cursor::new(self.pending).chain(read_half);
        (reader, DataWriter { inner: write_half })
    }
}

/// Write half of a data stream.
#[derive(Debug)]
pub struct DataWriter {
    inner: OwnedWriteHalf,
}

impl DataWriter {
    /// Mutable access for frame writes.
    pub fn get_mut(&mut self) -> &mut OwnedWriteHalf {
        &mut self.inner
    }

    /// Shuts the socket down in both directions.
    ///
    /// This also wakes any task blocked reading the other half.
    pub fn shutdown(&self) -> std::io::Result<()> {
        let stream: &TcpStream = self.inner.as_ref();
        SockRef::from(stream).shutdown(Shutdown::Both)
    }
}
