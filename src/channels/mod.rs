//! # Channels Module
//!
//! Logical-to-physical channel handling.
//!
//! This module handles:
//! - Remapping logical channels to physical channels
//! - Inverting channels whose map entry is negative
//! - Remembering the last value written to each physical channel

pub mod mapper;
pub mod cache;
