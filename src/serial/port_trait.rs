//! Trait abstraction for the write side of the link to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Trait for link write operations
#[async_trait]
pub trait LinkPort: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Shut the write direction down
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Wrapper around any async writer (serial stream half, duplex pipe) that
/// implements LinkPort
pub struct StreamPort<W> {
    inner: W,
}

impl<W> StreamPort<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> LinkPort for StreamPort<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
