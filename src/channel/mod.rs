//! Duplex channel abstraction between a module and its host.
//!
//! The runtime never touches a concrete transport. It opens a [`Channel`]
//! once, gets back a reader half and a writer half, and drives each from its
//! own task.
//!
//! # Architecture
//!
//! ```text
//! Channel (trait)
//!     │
//!     ├── UnixSocketChannel
//!     │   └── Host's Unix domain socket (default `../juno.sock`)
//!     │
//!     └── StreamChannel<R, W>
//!         └── Any tokio AsyncRead + AsyncWrite pair (pipes, `tokio::io::duplex`)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut channel = UnixSocketChannel::new("../juno.sock");
//! let (mut reader, mut writer) = channel.open().await?;
//!
//! writer.send(b"{\"requestId\":\"m-1\",\"type\":6}\n").await?;
//! while let Some(bytes) = reader.recv().await? {
//!     // bytes may hold any number of frames, or part of one
//! }
//! ```

pub mod stream;
pub mod unix;

use async_trait::async_trait;

/// Errors that can occur during channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// `open` was called on a channel that was already opened.
    AlreadyOpen,
    /// Failed to read from the transport.
    ReadFailed(String),
    /// Failed to write to the transport.
    SendFailed(String),
    /// The peer closed the transport.
    Closed,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::AlreadyOpen => write!(f, "Channel already open"),
            Self::ReadFailed(msg) => write!(f, "Read failed: {msg}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::Closed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// A transport that can be opened into a reader/writer pair.
#[async_trait]
pub trait Channel: Send + 'static {
    /// Establish the connection and split it into its two halves.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ConnectionFailed` if the transport cannot be
    /// reached, or `ChannelError::AlreadyOpen` on a second call.
    async fn open(&mut self) -> Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>), ChannelError>;
}

/// Receiving half of an open channel.
#[async_trait]
pub trait ChannelReader: Send + 'static {
    /// Wait for the next chunk of bytes.
    ///
    /// Returns `Ok(None)` once the peer has closed its side. A chunk carries
    /// whatever the transport delivered: zero or more frames and possibly a
    /// trailing partial frame.
    ///
    /// Must be cancel-safe: dropping the future before it completes loses
    /// no data.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::ReadFailed` on transport errors.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError>;
}

/// Sending half of an open channel.
#[async_trait]
pub trait ChannelWriter: Send + 'static {
    /// Write all of `bytes` to the transport.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Closed` once the peer has gone away, or
    /// `ChannelError::SendFailed` on other transport errors.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Flush and shut down the sending side.
    async fn close(&mut self);
}
