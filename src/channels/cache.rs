//! # Channel State Cache
//!
//! Last value confirmed on the wire for each physical channel. Used to skip
//! writes that would not change anything. Each connection's writer starts
//! from a fresh cache.

use crate::protocol::wire::CHANNEL_COUNT;

/// Per-link cache of the last written value per physical channel.
///
/// Entries start unknown, and an unknown entry never equals a concrete value,
/// so the first write to a channel always goes out.
#[derive(Debug, Clone, Default)]
pub struct ChannelStateCache {
    values: [Option<i32>; CHANNEL_COUNT as usize],
}

impl ChannelStateCache {
    /// Creates a cache with every channel unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `value` differs from the last committed value.
    pub fn should_write(&self, channel: u8, value: i32) -> bool {
        match Self::slot(channel) {
            Some(index) => self.values[index] != Some(value),
            None => true,
        }
    }

    /// Records a value the link has confirmed.
    pub fn commit(&mut self, channel: u8, value: i32) {
        if let Some(index) = Self::slot(channel) {
            self.values[index] = Some(value);
        }
    }

    /// Last committed value, if any.
    pub fn get(&self, channel: u8) -> Option<i32> {
        Self::slot(channel).and_then(|index| self.values[index])
    }

    #[inline]
    fn slot(channel: u8) -> Option<usize> {
        (1..=CHANNEL_COUNT)
            .contains(&channel)
            .then(|| channel as usize - 1)
    }
}
