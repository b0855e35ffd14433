//! # Servo Link Module
//!
//! The channel control and telemetry engine.
//!
//! This module handles:
//! - The link lifecycle (`Closed -> Opening -> Open -> Closing -> Closed`)
//! - Resolving logical channels and queueing writes onto the link
//! - Bulk `set` / `set_percent` with continue-on-error reporting
//! - Telemetry subscriptions and one-shot telemetry requests
//!
//! ## Usage
//!
//! ```no_run
//! use servo_bridge::channels::mapper::ChannelMapper;
//! use servo_bridge::link::ServoLink;
//! use servo_bridge::trace::TraceFilter;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let link = ServoLink::new(ChannelMapper::identity(), TraceFilter::new());
//!     link.open_serial("/dev/ttyUSB0", 115_200).await?;
//!
//!     link.set_channel(1, 512).await?;
//!     let sample = link.get_telemetry(3).await?;
//!     println!("sensor {} = {}", sample.id, sample.value);
//!
//!     link.close().await?;
//!     Ok(())
//! }
//! ```

mod reader;
mod writer;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::mapper::{ChannelMapper, Resolved};
use crate::config::Config;
use crate::error::{Result, ServoBridgeError};
use crate::protocol::encoder::{encode_get_telemetry, percent_to_value};
use crate::protocol::wire::{is_valid_value, TelemetrySample, CHANNEL_VALUE_MAX, CHANNEL_VALUE_MIN};
use crate::serial::port_trait::{LinkPort, StreamPort};
use crate::telemetry::{SubscriptionId, TelemetryHub};
use crate::trace::{TraceFilter, TAG_LINK};

use reader::LinkReader;
use writer::{LinkWriter, WriteRequest};

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Result of a successful single-channel set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// A command went out on the wire
    Sent,

    /// The channel already holds this value; nothing was written
    Unchanged,

    /// The logical channel is not in the active channel map; nothing was written
    Skipped,
}

/// Per-channel entry of a [`SetReport`]
#[derive(Debug)]
pub struct ChannelResult {
    /// Logical channel as given by the caller
    pub channel: u16,

    /// What happened to it
    pub outcome: Result<SetOutcome>,
}

/// Aggregated results of a bulk set, in input order
#[derive(Debug, Default)]
pub struct SetReport {
    pub results: Vec<ChannelResult>,
}

impl SetReport {
    /// True when no channel failed.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }

    /// Channels that succeeded, with their outcome.
    pub fn successes(&self) -> impl Iterator<Item = (u16, SetOutcome)> + '_ {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|outcome| (r.channel, *outcome)))
    }

    /// Channels that failed, with their error.
    pub fn failures(&self) -> impl Iterator<Item = (u16, &ServoBridgeError)> + '_ {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|err| (r.channel, err)))
    }
}

/// A set that has passed validation and may still be waiting on the writer
enum PendingSet {
    Done(SetOutcome),
    Queued(oneshot::Receiver<Result<SetOutcome>>),
}

impl PendingSet {
    async fn resolve(self) -> Result<SetOutcome> {
        match self {
            Self::Done(outcome) => Ok(outcome),
            Self::Queued(reply) => reply.await.unwrap_or(Err(ServoBridgeError::NotConnected)),
        }
    }
}

/// Tasks and queue of one open connection
struct Session {
    requests: mpsc::UnboundedSender<WriteRequest>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<std::io::Result<()>>,
}

struct LinkInner {
    state: LinkState,
    session: Option<Session>,
}

/// Channel control and telemetry engine over one duplex link.
///
/// All operations take `&self`; share the engine behind an `Arc` to issue
/// writes from several tasks. Writes are serialized by a single writer task,
/// which also owns the channel cache, so the cache lives exactly as long as
/// one connection.
pub struct ServoLink {
    mapper: ChannelMapper,
    trace: Arc<TraceFilter>,
    hub: Arc<TelemetryHub>,
    telemetry_enabled: bool,
    telemetry_timeout: Option<Duration>,
    inner: Mutex<LinkInner>,
}

impl std::fmt::Debug for ServoLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServoLink")
            .field("state", &self.state())
            .field("mapper", &self.mapper)
            .field("telemetry_enabled", &self.telemetry_enabled)
            .finish_non_exhaustive()
    }
}

impl ServoLink {
    /// Creates a closed link with telemetry enabled and no telemetry timeout.
    pub fn new(mapper: ChannelMapper, trace: TraceFilter) -> Self {
        Self {
            mapper,
            trace: Arc::new(trace),
            hub: Arc::new(TelemetryHub::new()),
            telemetry_enabled: true,
            telemetry_timeout: None,
            inner: Mutex::new(LinkInner {
                state: LinkState::Closed,
                session: None,
            }),
        }
    }

    /// Creates a closed link from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.channels.mapper(), config.debug.filter())
            .with_telemetry(config.telemetry.enabled)
            .with_telemetry_timeout(config.telemetry.timeout_ms.map(Duration::from_millis))
    }

    /// Enables or disables telemetry subscriptions.
    #[must_use]
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    /// Bounds how long [`get_telemetry`](Self::get_telemetry) waits.
    /// `None` waits until a sample arrives or the link closes.
    #[must_use]
    pub fn with_telemetry_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.telemetry_timeout = timeout;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    // ==================== Lifecycle ====================

    /// Opens the serial port at `path` and starts the link.
    pub async fn open_serial(&self, path: &str, baud_rate: u32) -> Result<()> {
        let path = path.to_string();
        self.open_with(move || async move { crate::serial::open_port(&path, baud_rate) })
            .await
    }

    /// Opens the link over whatever stream `connect` produces.
    ///
    /// The link is `Opening` while `connect` runs and falls back to `Closed`
    /// if it fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServoBridgeError::InvalidArgument`] if the link is not closed,
    /// or the error from `connect`.
    pub async fn open_with<F, Fut, S>(&self, connect: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.begin_opening()?;

        match connect().await {
            Ok(stream) => {
                let (read_half, write_half) = tokio::io::split(stream);
                self.start_session(read_half, StreamPort::new(write_half));
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open link: {}", e);
                self.lock().state = LinkState::Closed;
                Err(e)
            }
        }
    }

    /// Opens the link over an already-split transport.
    pub async fn open_split<R, P>(&self, reader: R, port: P) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        P: LinkPort + 'static,
    {
        self.begin_opening()?;
        self.start_session(reader, port);
        Ok(())
    }

    /// Closes the link.
    ///
    /// Stops the reader, fails queued writes and pending telemetry requests
    /// with `NotConnected`, then shuts the write side down.
    ///
    /// # Errors
    ///
    /// Returns [`ServoBridgeError::NotConnected`] if the link is not open, or
    /// [`ServoBridgeError::Io`] if shutting the port down fails. The link ends
    /// up `Closed` either way.
    pub async fn close(&self) -> Result<()> {
        let session = {
            let mut inner = self.lock();
            if inner.state != LinkState::Open {
                return Err(ServoBridgeError::NotConnected);
            }
            inner.state = LinkState::Closing;
            inner.session.take()
        };

        self.trace.emit(&[TAG_LINK], "closing");

        let mut result = Ok(());
        if let Some(session) = session {
            session.cancel.cancel();
            drop(session.requests);

            if let Err(e) = session.reader.await {
                warn!("Link reader task ended abnormally: {}", e);
            }

            result = match session.writer.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServoBridgeError::Io(e)),
                Err(e) => Err(ServoBridgeError::Io(std::io::Error::other(e))),
            };
        }

        self.hub.fail_pending();
        self.lock().state = LinkState::Closed;
        info!("Link closed");

        result
    }

    fn begin_opening(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != LinkState::Closed {
            return Err(ServoBridgeError::InvalidArgument(format!(
                "link is {:?}, expected Closed",
                inner.state
            )));
        }
        inner.state = LinkState::Opening;
        Ok(())
    }

    fn start_session<R, P>(&self, reader: R, port: P)
    where
        R: AsyncRead + Unpin + Send + 'static,
        P: LinkPort + 'static,
    {
        let cancel = CancellationToken::new();
        let (requests, queue) = mpsc::unbounded_channel();
        self.hub.reopen();

        let writer = LinkWriter::new(port, Arc::clone(&self.trace));
        let writer = tokio::spawn(writer.run(queue, cancel.clone()));

        let reader_task = LinkReader::new(Arc::clone(&self.hub), Arc::clone(&self.trace));
        let reader = tokio::spawn(reader_task.run(reader, cancel.clone()));

        let mut inner = self.lock();
        inner.session = Some(Session {
            requests,
            cancel,
            reader,
            writer,
        });
        inner.state = LinkState::Open;
        drop(inner);

        self.trace.emit(&[TAG_LINK], "open");
        info!("Link open");
    }

    // ==================== Channel Control ====================

    /// Sets one logical channel.
    ///
    /// # Errors
    ///
    /// - [`ServoBridgeError::Range`] for a value outside -1024..=1024 or a
    ///   physical channel outside 1..=16, before anything is written
    /// - [`ServoBridgeError::NotConnected`] if the link is not open
    /// - [`ServoBridgeError::Io`] if the write fails; the cache is untouched
    pub async fn set_channel(&self, logical: u16, value: i32) -> Result<SetOutcome> {
        self.submit(logical, value)?.resolve().await
    }

    /// Sets several logical channels, continuing past failures.
    ///
    /// Writes are queued in iteration order before any of them is awaited.
    pub async fn set<I>(&self, entries: I) -> SetReport
    where
        I: IntoIterator<Item = (u16, i32)>,
    {
        let submitted: Vec<(u16, Result<PendingSet>)> = entries
            .into_iter()
            .map(|(channel, value)| (channel, self.submit(channel, value)))
            .collect();

        Self::collect(submitted).await
    }

    /// Sets several logical channels from percentages.
    ///
    /// `value = round(percent * 1024 / 100)`; see [`set`](Self::set). A NaN or
    /// infinite percentage fails its channel with `Range`.
    pub async fn set_percent<I>(&self, entries: I) -> SetReport
    where
        I: IntoIterator<Item = (u16, f64)>,
    {
        let submitted: Vec<(u16, Result<PendingSet>)> = entries
            .into_iter()
            .map(|(channel, percent)| {
                let pending = percent_to_value(percent).and_then(|value| self.submit(channel, value));
                (channel, pending)
            })
            .collect();

        Self::collect(submitted).await
    }

    /// Awaits queued writes in submission order.
    async fn collect(submitted: Vec<(u16, Result<PendingSet>)>) -> SetReport {
        let mut report = SetReport::default();
        for (channel, pending) in submitted {
            let outcome = match pending {
                Ok(pending) => pending.resolve().await,
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                debug!("Channel {} failed: {}", channel, e);
            }
            report.results.push(ChannelResult { channel, outcome });
        }

        report
    }

    /// Validates and queues one write without waiting for it.
    fn submit(&self, logical: u16, value: i32) -> Result<PendingSet> {
        let (channel, value) = match self.mapper.resolve(logical, value)? {
            Resolved::Unmapped => {
                debug!("Logical channel {} not in channel map, skipping", logical);
                return Ok(PendingSet::Done(SetOutcome::Skipped));
            }
            Resolved::Physical { channel, value } => (channel, value),
        };

        if !is_valid_value(value) {
            return Err(ServoBridgeError::Range(format!(
                "channel value {} outside {}..={}",
                value, CHANNEL_VALUE_MIN, CHANNEL_VALUE_MAX
            )));
        }

        let (reply, rx) = oneshot::channel();
        self.enqueue(WriteRequest::SetChannel { channel, value, reply })?;
        Ok(PendingSet::Queued(rx))
    }

    fn enqueue(&self, request: WriteRequest) -> Result<()> {
        let inner = self.lock();
        match (&inner.state, &inner.session) {
            (LinkState::Open, Some(session)) => session
                .requests
                .send(request)
                .map_err(|_| ServoBridgeError::NotConnected),
            _ => Err(ServoBridgeError::NotConnected),
        }
    }

    // ==================== Telemetry ====================

    /// Registers a handler invoked for every decoded sample.
    ///
    /// Returns `None`, and drops the handler, when telemetry is disabled.
    pub fn on_telemetry<F>(&self, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(TelemetrySample) + Send + Sync + 'static,
    {
        if !self.telemetry_enabled {
            debug!("Telemetry disabled, ignoring handler");
            return None;
        }
        Some(self.hub.subscribe(Arc::new(handler)))
    }

    /// Removes a handler registered with [`on_telemetry`](Self::on_telemetry).
    pub fn remove_telemetry_handler(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Requests one sample for sensor `id` (1-based) and waits for it.
    ///
    /// # Errors
    ///
    /// - [`ServoBridgeError::InvalidArgument`] for `id <= 0`, before any I/O
    /// - [`ServoBridgeError::TelemetryDisabled`] if telemetry is off
    /// - [`ServoBridgeError::NotConnected`] if the link is not open, or closes
    ///   while waiting
    /// - [`ServoBridgeError::Timeout`] if a telemetry timeout is configured
    ///   and expires
    pub async fn get_telemetry(&self, id: i32) -> Result<TelemetrySample> {
        let line = encode_get_telemetry(id)?;

        if !self.telemetry_enabled {
            return Err(ServoBridgeError::TelemetryDisabled);
        }

        // Subscribe before sending so a fast reply is not missed. A reader that
        // has already failed the hub refuses the waiter; one that ends after
        // this point will fail it.
        let (subscription, sample) = self
            .hub
            .subscribe_once(id as u32)
            .ok_or(ServoBridgeError::NotConnected)?;

        if !self.reader_running() {
            self.hub.unsubscribe(subscription);
            return Err(ServoBridgeError::NotConnected);
        }

        let (reply, written) = oneshot::channel();
        let sent = match self.enqueue(WriteRequest::Line { line, reply }) {
            Ok(()) => written.await.unwrap_or(Err(ServoBridgeError::NotConnected)),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.hub.unsubscribe(subscription);
            return Err(e);
        }

        let received = match self.telemetry_timeout {
            None => sample.await,
            Some(limit) => match tokio::time::timeout(limit, sample).await {
                Ok(received) => received,
                Err(_) => {
                    self.hub.unsubscribe(subscription);
                    return Err(ServoBridgeError::Timeout(limit.as_millis() as u64));
                }
            },
        };

        received.map_err(|_| ServoBridgeError::NotConnected)
    }

    fn reader_running(&self) -> bool {
        let inner = self.lock();
        match (&inner.state, &inner.session) {
            (LinkState::Open, Some(session)) => !session.reader.is_finished(),
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ServoLink {
    fn drop(&mut self) {
        if let Some(session) = self.lock().session.take() {
            session.cancel.cancel();
        }
    }
}
