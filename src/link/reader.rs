//! # Link Reader
//!
//! Pulls newline-delimited lines off the read half of the link and routes
//! them: telemetry to the subscriber registry, everything else to the trace
//! sink under the `"serial"` tag.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::decoder::decode_line;
use crate::protocol::wire::{Inbound, MAX_LINE_LENGTH};
use crate::telemetry::TelemetryHub;
use crate::trace::{TraceFilter, TAG_SERIAL, TAG_TELEMETRY};

/// Reader half of an open link.
pub(crate) struct LinkReader {
    hub: Arc<TelemetryHub>,
    trace: Arc<TraceFilter>,
}

impl LinkReader {
    pub fn new(hub: Arc<TelemetryHub>, trace: Arc<TraceFilter>) -> Self {
        Self { hub, trace }
    }

    /// Reads until end of stream, a read error, or `cancel`.
    ///
    /// Lines longer than [`MAX_LINE_LENGTH`] are reported to the trace sink and
    /// dropped up to their terminator.
    ///
    /// On exit every pending one-shot telemetry waiter is failed, since no
    /// further samples can arrive.
    pub async fn run<R>(self, reader: R, cancel: CancellationToken)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(MAX_LINE_LENGTH);
        let mut discarding = false;

        loop {
            buf.clear();
            let mut limited = (&mut reader).take(MAX_LINE_LENGTH as u64);

            let read = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                read = limited.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("Link reached end of stream");
                    break;
                }
                Ok(_) => {
                    let terminated = buf.last() == Some(&b'\n');

                    if discarding {
                        discarding = !terminated;
                        continue;
                    }

                    if !terminated && buf.len() >= MAX_LINE_LENGTH {
                        discarding = true;
                        warn!("Dropping inbound line longer than {} bytes", MAX_LINE_LENGTH);
                        self.trace.emit(
                            &[TAG_SERIAL],
                            format_args!("over-long line dropped: {}", String::from_utf8_lossy(&buf)),
                        );
                        continue;
                    }

                    // Devices sometimes emit garbage while booting
                    let line = String::from_utf8_lossy(&buf);
                    self.route(&line);
                }
                Err(e) => {
                    warn!("Link read failed: {}", e);
                    break;
                }
            }
        }

        let failed = self.hub.fail_pending();
        if failed > 0 {
            debug!("Failed {} pending telemetry waits", failed);
        }
    }

    /// Routes one raw line.
    pub fn route(&self, line: &str) {
        match decode_line(line) {
            Inbound::Telemetry(sample) => {
                self.trace.emit(
                    &[TAG_TELEMETRY],
                    format_args!("sensor {} = {}", sample.id, sample.value),
                );
                self.hub.dispatch(sample);
            }
            Inbound::Trace(text) if text.trim().is_empty() => {}
            Inbound::Trace(text) => self.trace.emit(&[TAG_SERIAL], text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::TelemetrySample;
    use std::sync::Mutex;

    fn collecting_hub() -> (Arc<TelemetryHub>, Arc<Mutex<Vec<TelemetrySample>>>) {
        let hub = Arc::new(TelemetryHub::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.subscribe(Arc::new(move |s: TelemetrySample| sink.lock().unwrap().push(s)));
        (hub, seen)
    }

    #[tokio::test]
    async fn test_routes_telemetry_in_order() {
        let (hub, seen) = collecting_hub();
        let stream = tokio_test::io::Builder::new()
            .read(b"booting\n")
            .read(b"tlm: 0, 5\ntlm: 2, 42\n")
            .read(b"ok\r\n")
            .build();

        LinkReader::new(hub, Arc::new(TraceFilter::new()))
            .run(stream, CancellationToken::new())
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TelemetrySample { id: 1, value: 5 }, TelemetrySample { id: 3, value: 42 }]
        );
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let (hub, seen) = collecting_hub();
        let stream = tokio_test::io::Builder::new()
            .read(b"tlm: 1")
            .read(b", -9\n")
            .build();

        LinkReader::new(hub, Arc::new(TraceFilter::new()))
            .run(stream, CancellationToken::new())
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![TelemetrySample { id: 2, value: -9 }]);
    }

    #[tokio::test]
    async fn test_over_long_line_is_dropped() {
        let (hub, seen) = collecting_hub();
        let mut noise = b"tlm: 0, ".to_vec();
        noise.extend(std::iter::repeat(b'7').take(MAX_LINE_LENGTH * 3));
        let stream = tokio_test::io::Builder::new()
            .read(&noise)
            .read(b"\ntlm: 1, 8\n")
            .build();

        LinkReader::new(hub, Arc::new(TraceFilter::new()))
            .run(stream, CancellationToken::new())
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![TelemetrySample { id: 2, value: 8 }]);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let (hub, seen) = collecting_hub();
        let mut line = b"tlm: 3, 1".to_vec();
        line.resize(MAX_LINE_LENGTH - 1, b' ');
        line.push(b'\n');
        let stream = tokio_test::io::Builder::new().read(&line).build();

        LinkReader::new(hub, Arc::new(TraceFilter::new()))
            .run(stream, CancellationToken::new())
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![TelemetrySample { id: 4, value: 1 }]);
    }

    #[tokio::test]
    async fn test_end_of_stream_fails_pending_waiters() {
        let hub = Arc::new(TelemetryHub::new());
        let (_, rx) = hub.subscribe_once(3).unwrap();
        let stream = tokio_test::io::Builder::new().read(b"hello\n").build();

        LinkReader::new(Arc::clone(&hub), Arc::new(TraceFilter::new()))
            .run(stream, CancellationToken::new())
            .await;

        assert!(rx.await.is_err());
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_reader() {
        let hub = Arc::new(TelemetryHub::new());
        let (_client, server) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            LinkReader::new(hub, Arc::new(TraceFilter::new())).run(server, cancel.clone()),
        );
        cancel.cancel();

        task.await.unwrap();
    }
}
