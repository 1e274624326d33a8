//! [`Channel`] over any pair of tokio byte streams.
//!
//! Used for in-process hosts and tests (`tokio::io::duplex`), and as the
//! reader/writer halves behind [`UnixSocketChannel`](super::unix::UnixSocketChannel).

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{Channel, ChannelError, ChannelReader, ChannelWriter};
use crate::constants::READ_BUFFER_SIZE;

/// A channel backed by an already-connected reader and writer.
///
/// Can be opened once; a second `open` fails with
/// [`ChannelError::AlreadyOpen`].
pub struct StreamChannel<R, W> {
    halves: Option<(R, W)>,
    read_buffer_size: usize,
}

impl<R, W> std::fmt::Debug for StreamChannel<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("opened", &self.halves.is_none())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a reader and a writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            halves: Some((reader, writer)),
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Set the size of each transport read.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }
}

impl<S> StreamChannel<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split a bidirectional stream into a channel.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

#[async_trait]
impl<R, W> Channel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn open(&mut self) -> Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>), ChannelError> {
        let (reader, writer) = self.halves.take().ok_or(ChannelError::AlreadyOpen)?;
        Ok((
            Box::new(StreamReader::new(reader, self.read_buffer_size)),
            Box::new(StreamWriter::new(writer)),
        ))
    }
}

/// Reading half of a stream channel.
pub(crate) struct StreamReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R> StreamReader<R> {
    pub(crate) fn new(inner: R, read_buffer_size: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; read_buffer_size.max(1)],
        }
    }
}

#[async_trait]
impl<R> ChannelReader for StreamReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        // AsyncReadExt::read is cancel-safe: no bytes are consumed unless it
        // returns.
        match self.inner.read(&mut self.buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(self.buf[..n].to_vec())),
            Err(e) => Err(ChannelError::ReadFailed(e.to_string())),
        }
    }
}

/// Writing half of a stream channel.
pub(crate) struct StreamWriter<W> {
    inner: W,
}

impl<W> StreamWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> ChannelWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.inner.write_all(bytes).await.map_err(write_error)?;
        self.inner.flush().await.map_err(write_error)
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            log::debug!("[Channel] Shutdown error: {e}");
        }
    }
}

/// A peer that has gone away is `Closed`; anything else is a send failure.
fn write_error(e: io::Error) -> ChannelError {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected => {
            ChannelError::Closed
        }
        _ => ChannelError::SendFailed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_bytes_flow_both_ways() {
        let (local, mut remote) = duplex(1024);
        let mut channel = StreamChannel::from_stream(local);
        let (mut reader, mut writer) = channel.open().await.unwrap();

        writer.send(b"ping\n").await.unwrap();
        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping\n");

        remote.write_all(b"pong\n").await.unwrap();
        let got = reader.recv().await.unwrap().unwrap();
        assert_eq!(got, b"pong\n".to_vec());
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_eof() {
        let (local, remote) = duplex(64);
        let mut channel = StreamChannel::from_stream(local);
        let (mut reader, _writer) = channel.open().await.unwrap();
        drop(remote);
        assert_eq!(reader.recv().await, Ok(None));
    }

    #[tokio::test]
    async fn test_second_open_fails() {
        let (local, _remote) = duplex(64);
        let mut channel = StreamChannel::from_stream(local);
        assert!(channel.open().await.is_ok());
        assert!(matches!(channel.open().await, Err(ChannelError::AlreadyOpen)));
    }

    #[tokio::test]
    async fn test_small_read_buffer_splits_chunks() {
        let (local, mut remote) = duplex(64);
        let mut channel = StreamChannel::from_stream(local).with_read_buffer_size(2);
        let (mut reader, _writer) = channel.open().await.unwrap();
        remote.write_all(b"abcd").await.unwrap();
        let first = reader.recv().await.unwrap().unwrap();
        assert!(first.len() <= 2);
    }

    #[tokio::test]
    async fn test_send_after_peer_drop_is_closed() {
        let (local, remote) = duplex(64);
        let mut channel = StreamChannel::from_stream(local);
        let (_reader, mut writer) = channel.open().await.unwrap();
        drop(remote);
        assert_eq!(writer.send(b"late\n").await, Err(ChannelError::Closed));
    }

    #[test]
    fn test_write_error_classification() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(write_error(reset), ChannelError::Closed);
        let other = io::Error::other("disk on fire");
        assert_eq!(write_error(other), ChannelError::SendFailed("disk on fire".to_string()));
    }
}
