//! # Wire Protocol Constants and Types
//!
//! Core protocol definitions shared by the encoder and decoder.
//!
//! All commands are ASCII, newline-terminated and case-sensitive. Sensor ids
//! are 0-based on the wire and 1-based everywhere in the public API.

use serde::Serialize;

/// Number of physical servo channels on the bridge
pub const CHANNEL_COUNT: u8 = 16;

/// Channel value range (signed, centered on zero)
pub const CHANNEL_VALUE_MIN: i32 = -1024;
pub const CHANNEL_VALUE_MAX: i32 = 1024;

/// Full-scale channel value used for percent conversion
pub const CHANNEL_VALUE_FULL_SCALE: i32 = 1024;

/// Outgoing set-channel command keyword
pub const CMD_SET_CHANNEL: &str = "sc";

/// Outgoing get-telemetry command keyword
pub const CMD_GET_TELEMETRY: &str = "gt";

/// Prefix of an incoming telemetry line
pub const TELEMETRY_PREFIX: &str = "tlm:";

/// Line terminator used in both directions
pub const LINE_TERMINATOR: char = '\n';

/// Longest inbound line kept, terminator included; longer lines are dropped
pub const MAX_LINE_LENGTH: usize = 256;

/// One decoded sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetrySample {
    /// Sensor id (1-based)
    pub id: u32,

    /// Raw sensor value
    pub value: i32,
}

/// Classification of a single incoming line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Line matched the telemetry grammar
    Telemetry(TelemetrySample),

    /// Anything else: boot banners, acks, debug prints
    Trace(String),
}

/// Returns true if `value` is inside the channel value domain.
#[inline]
pub fn is_valid_value(value: i32) -> bool {
    (CHANNEL_VALUE_MIN..=CHANNEL_VALUE_MAX).contains(&value)
}

/// Returns true if `channel` is a valid 1-based physical channel.
#[inline]
pub fn is_valid_channel(channel: i32) -> bool {
    (1..=CHANNEL_COUNT as i32).contains(&channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_value_ranges() {
        assert_eq!(CHANNEL_VALUE_MIN, -1024);
        assert_eq!(CHANNEL_VALUE_MAX, 1024);
        assert_eq!(CHANNEL_COUNT, 16);
    }

    #[test]
    fn test_is_valid_value_bounds() {
        assert!(is_valid_value(-1024));
        assert!(is_valid_value(0));
        assert!(is_valid_value(1024));
        assert!(!is_valid_value(-1025));
        assert!(!is_valid_value(1025));
    }

    #[test]
    fn test_is_valid_channel_bounds() {
        assert!(!is_valid_channel(0));
        assert!(is_valid_channel(1));
        assert!(is_valid_channel(16));
        assert!(!is_valid_channel(17));
        assert!(!is_valid_channel(-1));
    }
}
