//! # Telemetry Module
//!
//! Observer registry for decoded telemetry samples.
//!
//! This module handles:
//! - Standing subscribers invoked for every sample
//! - One-shot waiters that resolve on the first sample for one sensor id
//!   and unregister themselves on delivery
//! - Failing every pending one-shot when the link goes away, and refusing
//!   new ones until the next connection reopens the registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::protocol::wire::TelemetrySample;

/// Callback invoked for every decoded sample
pub type TelemetryHandler = Arc<dyn Fn(TelemetrySample) + Send + Sync>;

/// Handle returned by the registry, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Subscriber {
    Standing(TelemetryHandler),
    Once {
        sensor: u32,
        reply: oneshot::Sender<TelemetrySample>,
    },
}

/// Registry of telemetry subscribers.
///
/// Samples are delivered in the order [`dispatch`](Self::dispatch) is called;
/// the link reader is the only caller, so that is line-receipt order.
#[derive(Default)]
pub struct TelemetryHub {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<(SubscriptionId, Subscriber)>,

    /// Set by `fail_pending`; one-shots are refused until `reopen`
    closed: bool,
}

impl std::fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("subscribers", &self.len())
            .finish_non_exhaustive()
    }
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a standing subscriber.
    pub fn subscribe(&self, handler: TelemetryHandler) -> SubscriptionId {
        let id = self.allocate_id();
        self.lock().subscribers.push((id, Subscriber::Standing(handler)));
        id
    }

    /// Registers a one-shot waiter for `sensor`.
    ///
    /// The receiver resolves with the first matching sample. It errors if the
    /// waiter is failed by [`fail_pending`](Self::fail_pending) first.
    ///
    /// Returns `None` once the registry has been failed and not yet reopened,
    /// since no sample can arrive for the waiter.
    pub fn subscribe_once(&self, sensor: u32) -> Option<(SubscriptionId, oneshot::Receiver<TelemetrySample>)> {
        let mut registry = self.lock();
        if registry.closed {
            return None;
        }

        let (reply, rx) = oneshot::channel();
        let id = self.allocate_id();
        registry.subscribers.push((id, Subscriber::Once { sensor, reply }));
        Some((id, rx))
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let subscribers = &mut self.lock().subscribers;
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Delivers a sample to every interested subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn dispatch(&self, sample: TelemetrySample) -> usize {
        let mut delivered = 0;
        let mut standing = Vec::new();

        {
            let mut registry = self.lock();
            let subscribers = &mut registry.subscribers;
            let current = std::mem::take(subscribers);

            for (id, subscriber) in current {
                match subscriber {
                    Subscriber::Standing(handler) => {
                        standing.push(Arc::clone(&handler));
                        subscribers.push((id, Subscriber::Standing(handler)));
                    }
                    Subscriber::Once { sensor, reply } if sensor == sample.id => {
                        if reply.send(sample).is_ok() {
                            delivered += 1;
                        }
                    }
                    Subscriber::Once { reply, .. } if reply.is_closed() => {
                        // Waiter was dropped without resolving
                    }
                    once => subscribers.push((id, once)),
                }
            }
        }

        // Handlers run outside the lock so they may (un)subscribe
        for handler in standing {
            handler(sample);
            delivered += 1;
        }

        delivered
    }

    /// Drops every one-shot waiter so its receiver errors out, and refuses
    /// new ones until [`reopen`](Self::reopen).
    ///
    /// Standing subscribers are kept; they survive reconnects.
    pub fn fail_pending(&self) -> usize {
        let mut registry = self.lock();
        registry.closed = true;
        let before = registry.subscribers.len();
        registry
            .subscribers
            .retain(|(_, subscriber)| matches!(subscriber, Subscriber::Standing(_)));
        before - registry.subscribers.len()
    }

    /// Accepts one-shot waiters again; called when a new connection starts.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Number of registered subscribers of either kind.
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
