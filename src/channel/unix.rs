//! [`Channel`] over the host's Unix domain socket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UnixStream;

use super::stream::{StreamReader, StreamWriter};
use super::{Channel, ChannelError, ChannelReader, ChannelWriter};
use crate::constants::READ_BUFFER_SIZE;

/// Connects to a host listening on a Unix domain socket.
#[derive(Debug, Clone)]
pub struct UnixSocketChannel {
    path: PathBuf,
    read_buffer_size: usize,
    opened: bool,
}

impl UnixSocketChannel {
    /// Create a channel for the socket at `path`. Nothing is connected until
    /// [`Channel::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_buffer_size: READ_BUFFER_SIZE,
            opened: false,
        }
    }

    /// Set the size of each socket read.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Channel for UnixSocketChannel {
    async fn open(&mut self) -> Result<(Box<dyn ChannelReader>, Box<dyn ChannelWriter>), ChannelError> {
        if self.opened {
            return Err(ChannelError::AlreadyOpen);
        }
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            ChannelError::ConnectionFailed(format!("{}: {e}", self.path.display()))
        })?;
        self.opened = true;
        log::info!("[Channel] Connected to {}", self.path.display());

        let (read_half, write_half) = stream.into_split();
        Ok((
            Box::new(StreamReader::new(read_half, self.read_buffer_size)),
            Box::new(StreamWriter::new(write_half)),
        ))
    }
}
