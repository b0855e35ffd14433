//! # Servo Line Protocol Module
//!
//! Implementation of the line-oriented ASCII protocol spoken by the radio bridge.
//!
//! This module handles:
//! - Channel-set command encoding (`sc <channel> <value>`)
//! - Telemetry request encoding (`gt <index>`)
//! - Telemetry line decoding (`tlm: <id>, <value>`)
//! - Classification of free-form diagnostic lines

pub mod wire;
pub mod encoder;
pub mod decoder;
