//! # Debug Trace Filter
//!
//! Tag-gated diagnostic sink. Each message carries one or more tags
//! (`"serial"`, `"write"`, `"telemetry"`, ...); it is emitted iff the filter
//! holds `"all"` or at least one of those tags.
//!
//! Accepted messages go to `tracing` under the `servo_bridge::trace` target,
//! so the subscriber's `EnvFilter` still applies on top of the tag set.

use std::collections::HashSet;

use tracing::info;

/// Wildcard tag enabling every message
pub const TAG_ALL: &str = "all";

/// Raw lines from the device that are not telemetry
pub const TAG_SERIAL: &str = "serial";

/// Outgoing writes and cache decisions
pub const TAG_WRITE: &str = "write";

/// Decoded telemetry samples
pub const TAG_TELEMETRY: &str = "telemetry";

/// Link state transitions
pub const TAG_LINK: &str = "link";

/// Set of active trace tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceFilter {
    tags: HashSet<String>,
}

impl TraceFilter {
    /// Creates a filter that emits nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter from a list of tags.
    #[must_use]
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Enables one more tag.
    pub fn enable(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// Pure predicate: should a message with these tags be shown?
    pub fn should_emit(&self, tags: &[&str]) -> bool {
        self.tags.contains(TAG_ALL) || tags.iter().any(|tag| self.tags.contains(*tag))
    }

    /// Emits `message` if any of its tags is enabled.
    pub fn emit(&self, tags: &[&str], message: impl std::fmt::Display) {
        if self.should_emit(tags) {
            info!(target: "servo_bridge::trace", tags = ?tags, "{}", message);
        }
    }
}
