//! # Channel Mapper Module
//!
//! Resolves logical channel ids into physical channels on the bridge.
//!
//! ## Map Semantics
//!
//! | Map | Entry for logical | Result |
//! |-----|-------------------|--------|
//! | none | - | identity |
//! | present | missing | skipped (no-op) |
//! | present | `n > 0` | channel `n`, value unchanged |
//! | present | `n < 0` | channel `-n`, value negated |
//!
//! Physical channels outside 1-16 (including 0) are a range error.
//!
//! ## Usage
//!
//! ```
//! use servo_bridge::channels::mapper::{ChannelMapper, Resolved};
//!
//! let mapper = ChannelMapper::with_map([(2, -1)]);
//! let resolved = mapper.resolve(2, 300).unwrap();
//! assert_eq!(resolved, Resolved::Physical { channel: 1, value: -300 });
//! ```

use std::collections::HashMap;

use crate::error::{Result, ServoBridgeError};
use crate::protocol::wire::{is_valid_channel, CHANNEL_COUNT};

/// Outcome of resolving a logical channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Write `value` to physical `channel`
    Physical { channel: u8, value: i32 },

    /// Logical channel has no entry in the active map
    Unmapped,
}

/// Translates logical channels into physical channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelMapper {
    /// Logical -> signed physical. `None` means identity.
    map: Option<HashMap<u16, i32>>,
}

impl ChannelMapper {
    /// Creates an identity mapper.
    #[must_use]
    pub fn identity() -> Self {
        Self { map: None }
    }

    /// Creates a mapper from `(logical, physical)` pairs.
    ///
    /// A negative physical entry inverts the channel.
    #[must_use]
    pub fn with_map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, i32)>,
    {
        Self {
            map: Some(entries.into_iter().collect()),
        }
    }

    /// Returns true if a remap table is active.
    pub fn is_identity(&self) -> bool {
        self.map.is_none()
    }

    /// Resolves a logical channel and value.
    ///
    /// # Errors
    ///
    /// Returns [`ServoBridgeError::Range`] if the resulting physical channel
    /// is outside 1-16.
    pub fn resolve(&self, logical: u16, value: i32) -> Result<Resolved> {
        let (physical, value) = match &self.map {
            None => (logical as i32, value),
            Some(map) => match map.get(&logical) {
                None => return Ok(Resolved::Unmapped),
                Some(&entry) if entry < 0 => (entry.saturating_abs(), value.saturating_neg()),
                Some(&entry) => (entry, value),
            },
        };

        if !is_valid_channel(physical) {
            return Err(ServoBridgeError::Range(format!(
                "logical channel {} resolves to physical channel {} outside 1..={}",
                logical, physical, CHANNEL_COUNT
            )));
        }

        Ok(Resolved::Physical {
            channel: physical as u8,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Identity Tests ====================

    #[test]
    fn test_identity_passes_through() {
        let mapper = ChannelMapper::identity();
        assert!(mapper.is_identity());
        assert_eq!(
            mapper.resolve(5, 200).unwrap(),
            Resolved::Physical { channel: 5, value: 200 }
        );
    }

    #[test]
    fn test_default_is_identity() {
        assert!(ChannelMapper::default().is_identity());
    }

    #[test]
    fn test_identity_rejects_channel_17() {
        let result = ChannelMapper::identity().resolve(17, 0);
        assert!(matches!(result, Err(ServoBridgeError::Range(_))));
    }

    #[test]
    fn test_identity_rejects_channel_zero() {
        let result = ChannelMapper::identity().resolve(0, 0);
        assert!(matches!(result, Err(ServoBridgeError::Range(_))));
    }

    // ==================== Remap Tests ====================

    #[test]
    fn test_map_positive_entry() {
        let mapper = ChannelMapper::with_map([(1, 9)]);
        assert_eq!(
            mapper.resolve(1, 100).unwrap(),
            Resolved::Physical { channel: 9, value: 100 }
        );
    }

    #[test]
    fn test_map_negative_entry_inverts() {
        let mapper = ChannelMapper::with_map([(2, -1)]);
        assert_eq!(
            mapper.resolve(2, 300).unwrap(),
            Resolved::Physical { channel: 1, value: -300 }
        );
    }

    #[test]
    fn test_map_missing_entry_is_unmapped() {
        let mapper = ChannelMapper::with_map([(2, -1)]);
        assert_eq!(mapper.resolve(3, 10).unwrap(), Resolved::Unmapped);
    }

    #[test]
    fn test_map_entry_zero_is_range_error() {
        let mapper = ChannelMapper::with_map([(4, 0)]);
        assert!(matches!(mapper.resolve(4, 10), Err(ServoBridgeError::Range(_))));
    }

    #[test]
    fn test_map_entry_out_of_range() {
        let mapper = ChannelMapper::with_map([(1, 20), (2, -17)]);
        assert!(matches!(mapper.resolve(1, 0), Err(ServoBridgeError::Range(_))));
        assert!(matches!(mapper.resolve(2, 0), Err(ServoBridgeError::Range(_))));
    }

    #[test]
    fn test_map_does_not_validate_value() {
        // Value domain is checked by the writer, not the mapper
        let mapper = ChannelMapper::with_map([(1, -2)]);
        assert_eq!(
            mapper.resolve(1, 5000).unwrap(),
            Resolved::Physical { channel: 2, value: -5000 }
        );
    }
}
