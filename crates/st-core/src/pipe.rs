//! Duplex pipe transport
//!
//! A [`DuplexPipe`] is a bidirectional byte channel between two processes
//! with length-prefixed framing on top. One end *creates* the channel under a
//! fresh name; the other end *connects* using a [`PipeToken`] that names it.
//! The token is what crosses process boundaries, never the live handle.
//!
//! Framed messages use the [`MessageCodec`] wire format. `recv` never
//! returns a partial message: bytes that do not yet form a whole frame stay
//! buffered until the rest arrives.

use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use st_protocol::{MessageCodec, ProtocolError};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;
use crate::sync::lock;
use crate::sys;

/// Returned by [`DuplexPipe::poll`] once the channel can never yield data again
pub const POLL_INVALID: isize = -1;

/// Sleep between availability checks while blocking
const SPIN_INTERVAL: Duration = Duration::from_micros(10);

/// Largest single read from the OS
const READ_CHUNK: usize = 64 * 1024;

/// Which end of a channel a handle is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipeRole {
    /// The end that created the channel
    Creator,
    /// The end that connected to an existing channel
    Connector,
}

/// Capability token naming one end of a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeToken {
    pub name: String,
    pub role: PipeRole,
}

impl PipeToken {
    /// Token that connects to an existing channel
    pub fn connector(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PipeRole::Connector,
        }
    }
}

struct Reader {
    conn: sys::Conn,
    buf: BytesMut,
}

impl Reader {
    /// Pull whatever the OS has buffered.
    ///
    /// Returns `Ok(false)` when nothing was available, and `BrokenPipe` when
    /// the peer is gone.
    fn fill(&mut self) -> Result<bool, TransportError> {
        let available = match self.conn.available()? {
            Some(0) => return Ok(false),
            Some(n) => n.min(READ_CHUNK),
            None => return Err(TransportError::BrokenPipe),
        };

        let start = self.buf.len();
        self.buf.resize(start + available, 0);
        match self.conn.read(&mut self.buf[start..]) {
            Ok(0) => {
                self.buf.truncate(start);
                Err(TransportError::BrokenPipe)
            }
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(true)
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(e.into())
            }
        }
    }
}

/// The established connection shared by all I/O
struct Link {
    reader: Mutex<Reader>,
    writer: Mutex<sys::Conn>,
    control: sys::Conn,
}

impl Link {
    fn new(conn: sys::Conn) -> Result<Self, TransportError> {
        Ok(Self {
            reader: Mutex::new(Reader {
                conn: conn.try_clone()?,
                buf: BytesMut::new(),
            }),
            writer: Mutex::new(conn.try_clone()?),
            control: conn,
        })
    }
}

/// Bidirectional framed byte channel
pub struct DuplexPipe {
    token: PipeToken,
    open: AtomicBool,
    listener: Mutex<Option<sys::Listener>>,
    link: OnceLock<Link>,
}

impl DuplexPipe {
    /// Create a new channel under a fresh unique name
    pub fn create() -> Result<Self, TransportError> {
        Self::open(&PipeToken {
            name: sys::pipe_name(),
            role: PipeRole::Creator,
        })
    }

    /// Open the end of a channel named by `token`
    pub fn open(token: &PipeToken) -> Result<Self, TransportError> {
        let pipe = Self {
            token: token.clone(),
            open: AtomicBool::new(true),
            listener: Mutex::new(None),
            link: OnceLock::new(),
        };

        match token.role {
            PipeRole::Creator => {
                *lock(&pipe.listener) = Some(sys::Listener::bind(&token.name)?);
                tracing::debug!(name = %token.name, "created pipe");
            }
            PipeRole::Connector => {
                let conn = sys::Conn::connect(&token.name)?;
                let _ = pipe.link.set(Link::new(conn)?);
                tracing::debug!(name = %token.name, "connected pipe");
            }
        }

        Ok(pipe)
    }

    /// Token a peer uses to connect to this channel
    pub fn token(&self) -> PipeToken {
        PipeToken::connector(self.token.name.clone())
    }

    /// A second handle connected to this channel.
    ///
    /// Only valid until the creator has accepted its first connection.
    pub fn dup(&self) -> Result<Self, TransportError> {
        self.ensure_open()?;
        Self::open(&self.token())
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.token.name
    }

    /// Whether this handle created the channel
    pub fn is_creator(&self) -> bool {
        self.token.role == PipeRole::Creator
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }

    /// Serialize `message` and write it as one frame
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let mut frame = BytesMut::new();
        MessageCodec::<T>::new().encode(message, &mut frame)?;
        self.write(&frame)
    }

    /// Block until a whole frame has arrived and deserialize it
    pub fn recv<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        let link = self.wait_link()?;
        let mut codec = MessageCodec::<T>::new();
        let mut reader = lock(&link.reader);

        loop {
            if let Some(message) = codec.decode(&mut reader.buf)? {
                return Ok(message);
            }
            self.ensure_open()?;
            if !reader.fill()? {
                thread::sleep(SPIN_INTERVAL);
            }
        }
    }

    /// Return a frame if a whole one is available, without blocking
    pub fn try_recv<T: DeserializeOwned>(&self) -> Result<Option<T>, TransportError> {
        let Some(link) = self.try_link()? else {
            return Ok(None);
        };
        let mut codec = MessageCodec::<T>::new();
        let mut reader = lock(&link.reader);

        if let Some(message) = codec.decode(&mut reader.buf)? {
            return Ok(Some(message));
        }
        while reader.fill()? {
            if let Some(message) = codec.decode(&mut reader.buf)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Like [`try_recv`](Self::try_recv), but frames that fail to
    /// deserialize are logged and skipped
    pub fn next_message<T: DeserializeOwned>(&self) -> Result<Option<T>, TransportError> {
        loop {
            match self.try_recv::<T>() {
                Err(TransportError::Protocol(ProtocolError::Serialization(e))) => {
                    tracing::warn!(pipe = self.name(), error = %e, "dropping malformed frame");
                }
                other => return other,
            }
        }
    }

    /// Write raw bytes
    pub fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let link = self.wait_link()?;
        let mut writer = lock(&link.writer);
        self.ensure_open()?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Block until exactly `n` raw bytes have been read
    pub fn read(&self, n: usize) -> Result<Vec<u8>, TransportError> {
        let link = self.wait_link()?;
        let mut reader = lock(&link.reader);

        while reader.buf.len() < n {
            self.ensure_open()?;
            if !reader.fill()? {
                thread::sleep(SPIN_INTERVAL);
            }
        }
        Ok(reader.buf.split_to(n).to_vec())
    }

    /// Every raw byte currently available, possibly none
    pub fn read_available(&self) -> Result<Vec<u8>, TransportError> {
        let Some(link) = self.try_link()? else {
            return Ok(Vec::new());
        };
        let mut reader = lock(&link.reader);
        loop {
            match reader.fill() {
                Ok(true) => {}
                Ok(false) => break,
                Err(TransportError::BrokenPipe) if !reader.buf.is_empty() => break,
                Err(e) => return Err(e),
            }
        }
        let len = reader.buf.len();
        Ok(reader.buf.split_to(len).to_vec())
    }

    /// Number of bytes readable without blocking, or [`POLL_INVALID`] once
    /// the peer is gone and nothing is buffered
    pub fn poll(&self) -> Result<isize, TransportError> {
        let Some(link) = self.try_link()? else {
            return Ok(0);
        };
        let reader = lock(&link.reader);
        let buffered = reader.buf.len();

        match reader.conn.available()? {
            Some(n) => Ok((buffered + n) as isize),
            None if buffered > 0 => Ok(buffered as isize),
            None => Ok(POLL_INVALID),
        }
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<(), TransportError> {
        let Some(link) = self.try_link()? else {
            return Ok(());
        };
        lock(&link.writer).flush()?;
        Ok(())
    }

    /// Release the channel. A second call fails.
    pub fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(TransportError::AlreadyClosed);
        }

        lock(&self.listener).take();
        if let Some(link) = self.link.get() {
            if let Err(e) = link.control.shutdown() {
                tracing::debug!(name = %self.token.name, error = %e, "pipe shutdown failed");
            }
        }

        tracing::debug!(name = %self.token.name, "closed pipe");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// The connection, accepting it on the creator side if it has arrived
    fn try_link(&self) -> Result<Option<&Link>, TransportError> {
        self.ensure_open()?;
        if let Some(link) = self.link.get() {
            return Ok(Some(link));
        }

        let mut listener = lock(&self.listener);
        if let Some(link) = self.link.get() {
            return Ok(Some(link));
        }
        let Some(pending) = listener.as_mut() else {
            return Err(TransportError::Closed);
        };
        let Some(conn) = pending.try_accept()? else {
            return Ok(None);
        };

        let _ = self.link.set(Link::new(conn)?);
        *listener = None;
        tracing::debug!(name = %self.token.name, "accepted pipe connection");
        Ok(self.link.get())
    }

    /// The connection, waiting for the creator to accept it
    fn wait_link(&self) -> Result<&Link, TransportError> {
        loop {
            if let Some(link) = self.try_link()? {
                return Ok(link);
            }
            thread::sleep(SPIN_INTERVAL);
        }
    }
}

impl fmt::Debug for DuplexPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexPipe")
            .field("name", &self.token.name)
            .field("role", &self.token.role)
            .field("open", &!self.is_closed())
            .field("linked", &self.link.get().is_some())
            .finish()
    }
}
