//! # Link Writer
//!
//! Single task that owns the write side of the link and the channel cache.
//! Requests arrive over an unbounded queue and are handled strictly one at a
//! time in submission order, so bytes from two commands never interleave.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SetOutcome;
use crate::channels::cache::ChannelStateCache;
use crate::error::{Result, ServoBridgeError};
use crate::protocol::encoder::encode_set_channel;
use crate::serial::port_trait::LinkPort;
use crate::trace::{TraceFilter, TAG_WRITE};

/// A request queued for the writer task.
pub(crate) enum WriteRequest {
    /// Set a physical channel, consulting and updating the cache
    SetChannel {
        channel: u8,
        value: i32,
        reply: oneshot::Sender<Result<SetOutcome>>,
    },
    /// Write a pre-encoded line as-is
    Line {
        line: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

impl WriteRequest {
    fn fail_not_connected(self) {
        match self {
            Self::SetChannel { reply, .. } => {
                let _ = reply.send(Err(ServoBridgeError::NotConnected));
            }
            Self::Line { reply, .. } => {
                let _ = reply.send(Err(ServoBridgeError::NotConnected));
            }
        }
    }
}

/// Writer half of an open link.
pub(crate) struct LinkWriter<P> {
    port: P,
    cache: ChannelStateCache,
    trace: Arc<TraceFilter>,
}

impl<P: LinkPort> LinkWriter<P> {
    /// Creates a writer with an empty cache.
    pub fn new(port: P, trace: Arc<TraceFilter>) -> Self {
        Self {
            port,
            cache: ChannelStateCache::new(),
            trace,
        }
    }

    /// Processes requests until the queue closes or `cancel` fires.
    ///
    /// Requests still queued at that point fail with `NotConnected`. An
    /// in-flight write always completes before cancellation is observed.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<WriteRequest>,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        requests.close();
        let mut dropped = 0usize;
        while let Ok(request) = requests.try_recv() {
            request.fail_not_connected();
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Failed {} queued writes on close", dropped);
        }

        self.port.shutdown().await
    }

    async fn handle(&mut self, request: WriteRequest) {
        match request {
            WriteRequest::SetChannel { channel, value, reply } => {
                let result = self.set_channel(channel, value).await;
                let _ = reply.send(result);
            }
            WriteRequest::Line { line, reply } => {
                let result = self.send(&line).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Writes `sc` for a channel unless the cache says it is already there.
    ///
    /// The cache is committed only after the write and flush both succeed.
    pub async fn set_channel(&mut self, channel: u8, value: i32) -> Result<SetOutcome> {
        if !self.cache.should_write(channel, value) {
            self.trace.emit(&[TAG_WRITE], format_args!("ch{} already at {}", channel, value));
            return Ok(SetOutcome::Unchanged);
        }

        let line = encode_set_channel(channel, value)?;
        self.send(&line).await?;
        self.cache.commit(channel, value);

        Ok(SetOutcome::Sent)
    }

    /// Writes one line and flushes it.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        let written = match self.port.write_all(line.as_bytes()).await {
            Ok(()) => self.port.flush().await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                debug!("Sent {:?}", line.trim_end());
                self.trace.emit(&[TAG_WRITE], format_args!("> {}", line.trim_end()));
                Ok(())
            }
            Err(e) => {
                warn!("Write of {:?} failed: {}", line.trim_end(), e);
                Err(ServoBridgeError::Io(e))
            }
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ChannelStateCache {
        &self.cache
    }
}
