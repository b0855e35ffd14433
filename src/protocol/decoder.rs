//! # Line Decoder
//!
//! Classifies incoming protocol lines as telemetry or trace text.

use super::wire::*;

/// Decode one incoming line
///
/// A line is telemetry iff it reads `tlm: <id>, <value>` with signed integer
/// fields. The wire id is 0-based and is shifted to the 1-based API id.
/// Everything else comes back verbatim as [`Inbound::Trace`]; unparsed lines
/// are normal traffic, not errors.
///
/// # Examples
///
/// ```
/// use servo_bridge::protocol::decoder::decode_line;
/// use servo_bridge::protocol::wire::{Inbound, TelemetrySample};
///
/// assert_eq!(
///     decode_line("tlm: 2, 42"),
///     Inbound::Telemetry(TelemetrySample { id: 3, value: 42 })
/// );
/// assert_eq!(decode_line("ready"), Inbound::Trace("ready".to_string()));
/// ```
pub fn decode_line(line: &str) -> Inbound {
    let line = line.trim_end_matches(['\r', '\n']);

    match parse_telemetry(line) {
        Some(sample) => Inbound::Telemetry(sample),
        None => Inbound::Trace(line.to_string()),
    }
}

/// Parse the `tlm: <id>, <value>` grammar
fn parse_telemetry(line: &str) -> Option<TelemetrySample> {
    let body = line.trim_start().strip_prefix(TELEMETRY_PREFIX)?;
    let (id, value) = body.split_once(',')?;

    let wire_id: i64 = id.trim().parse().ok()?;
    let value: i32 = value.trim().parse().ok()?;

    // Negative wire ids have no API counterpart
    let id = u32::try_from(wire_id.checked_add(1)?).ok()?;
    if id == 0 {
        return None;
    }

    Some(TelemetrySample { id, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::encode_get_telemetry;

    #[test]
    fn test_decode_telemetry_line() {
        let decoded = decode_line("tlm: 2, 42");
        assert_eq!(decoded, Inbound::Telemetry(TelemetrySample { id: 3, value: 42 }));
    }

    #[test]
    fn test_decode_negative_value() {
        let decoded = decode_line("tlm: 0, -17");
        assert_eq!(decoded, Inbound::Telemetry(TelemetrySample { id: 1, value: -17 }));
    }

    #[test]
    fn test_decode_strips_crlf() {
        let decoded = decode_line("tlm: 5, 100\r\n");
        assert_eq!(decoded, Inbound::Telemetry(TelemetrySample { id: 6, value: 100 }));
    }

    #[test]
    fn test_decode_tolerates_missing_spaces() {
        let decoded = decode_line("tlm:1,7");
        assert_eq!(decoded, Inbound::Telemetry(TelemetrySample { id: 2, value: 7 }));
    }

    #[test]
    fn test_decode_is_case_sensitive() {
        assert_eq!(decode_line("TLM: 1, 2"), Inbound::Trace("TLM: 1, 2".to_string()));
    }

    #[test]
    fn test_decode_negative_wire_id_is_trace() {
        assert_eq!(decode_line("tlm: -1, 2"), Inbound::Trace("tlm: -1, 2".to_string()));
    }

    #[test]
    fn test_decode_malformed_telemetry_is_trace() {
        assert!(matches!(decode_line("tlm: x, 2"), Inbound::Trace(_)));
        assert!(matches!(decode_line("tlm: 1"), Inbound::Trace(_)));
        assert!(matches!(decode_line("tlm: 1, 2, 3"), Inbound::Trace(_)));
        assert!(matches!(decode_line("tlm: 1, "), Inbound::Trace(_)));
    }

    #[test]
    fn test_decode_banner_is_trace_verbatim() {
        let decoded = decode_line("Servo bridge v2 booting...\n");
        assert_eq!(decoded, Inbound::Trace("Servo bridge v2 booting...".to_string()));
    }

    #[test]
    fn test_telemetry_id_offset_round_trip() {
        // API id 3 goes out as index 2 and comes back as id 3
        assert_eq!(encode_get_telemetry(3).unwrap(), "gt 2\n");
        match decode_line("tlm: 2, 42") {
            Inbound::Telemetry(sample) => {
                assert_eq!(sample.id, 3);
                assert_eq!(sample.value, 42);
            }
            other => panic!("Expected telemetry, got: {:?}", other),
        }
    }
}
