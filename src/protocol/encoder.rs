//! # Command Encoder
//!
//! Encodes outgoing commands into protocol lines.

use super::wire::*;
use crate::error::{Result, ServoBridgeError};

/// Encode a set-channel command
///
/// # Arguments
///
/// * `channel` - Physical channel (1-16)
/// * `value` - Channel value (-1024 to 1024)
///
/// # Returns
///
/// * `Result<String>` - Complete line including the trailing newline
///
/// # Errors
///
/// Returns [`ServoBridgeError::Range`] if either argument is outside its domain.
///
/// # Examples
///
/// ```
/// use servo_bridge::protocol::encoder::encode_set_channel;
///
/// let line = encode_set_channel(1, -300).unwrap();
/// assert_eq!(line, "sc 1 -300\n");
/// ```
pub fn encode_set_channel(channel: u8, value: i32) -> Result<String> {
    if !is_valid_channel(channel as i32) {
        return Err(ServoBridgeError::Range(format!(
            "physical channel {} outside 1..={}",
            channel, CHANNEL_COUNT
        )));
    }

    if !is_valid_value(value) {
        return Err(ServoBridgeError::Range(format!(
            "channel value {} outside {}..={}",
            value, CHANNEL_VALUE_MIN, CHANNEL_VALUE_MAX
        )));
    }

    Ok(format!("{} {} {}{}", CMD_SET_CHANNEL, channel, value, LINE_TERMINATOR))
}

/// Encode a telemetry request
///
/// The API id is 1-based; the wire index is 0-based.
///
/// # Errors
///
/// Returns [`ServoBridgeError::InvalidArgument`] for an id of zero or less.
///
/// # Examples
///
/// ```
/// use servo_bridge::protocol::encoder::encode_get_telemetry;
///
/// assert_eq!(encode_get_telemetry(3).unwrap(), "gt 2\n");
/// ```
pub fn encode_get_telemetry(id: i32) -> Result<String> {
    if id < 1 {
        return Err(ServoBridgeError::InvalidArgument(format!(
            "telemetry id must be >= 1, got {}",
            id
        )));
    }

    Ok(format!("{} {}{}", CMD_GET_TELEMETRY, id - 1, LINE_TERMINATOR))
}

/// Convert a percentage into a channel value
///
/// `value = round(percent * 1024 / 100)`. Percentages outside -100..=100 are
/// not rejected here; the result is range-checked when it is sent.
///
/// # Errors
///
/// Returns [`ServoBridgeError::Range`] for NaN or infinite percentages.
pub fn percent_to_value(percent: f64) -> Result<i32> {
    if !percent.is_finite() {
        return Err(ServoBridgeError::Range(format!(
            "percentage {} is not a finite number",
            percent
        )));
    }

    let scaled = (percent * CHANNEL_VALUE_FULL_SCALE as f64 / 100.0).round();

    // Saturate so absurd inputs still land outside the domain and get rejected
    Ok(scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}
