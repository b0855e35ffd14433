//! # Serial Communication Module
//!
//! Opens the serial link to the radio bridge.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate (8N1, no flow control)
//! - Adapting the write half of any async stream to [`port_trait::LinkPort`]

pub mod port_trait;

use crate::error::{Result, ServoBridgeError};
use tracing::{debug, info};

/// Default bridge baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rates accepted by the bridge firmware
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600];

/// Open a serial port with the bridge's line settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
///
/// # Returns
///
/// * `Result<SerialStream>` - Opened serial port
///
/// # Errors
///
/// Returns [`ServoBridgeError::Io`] if the driver refuses to open the port. The
/// error kind follows the driver's (`NotFound` for a missing device) and the
/// message names the path.
///
/// # Examples
///
/// ```no_run
/// use servo_bridge::serial::{open_port, DEFAULT_BAUD_RATE};
///
/// let port = open_port("/dev/ttyUSB0", DEFAULT_BAUD_RATE)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    debug!("Opening serial port {} at {} baud", path, baud_rate);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| {
            let message = format!("Failed to open {}: {}", path, e);
            let kind = std::io::Error::from(e).kind();
            ServoBridgeError::Io(std::io::Error::new(kind, message))
        })?;

    info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(port)
}
