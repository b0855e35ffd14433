//! # Servo Bridge Library
//!
//! Drive servo channels and read sensor telemetry through a serial radio bridge.
//!
//! This library provides the channel control and telemetry engine: it turns
//! channel-set requests into the bridge's line protocol, suppresses redundant
//! writes, applies an optional remap/invert table, and decodes telemetry
//! arriving on the same serial link.

pub mod config;
pub mod error;
pub mod protocol;
pub mod channels;
pub mod serial;
pub mod telemetry;
pub mod trace;
pub mod link;
pub mod repl;
