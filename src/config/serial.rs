use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

use super::types::{DataBits, Parity, StopBits};

/// Line rates the RTU bus side supports.
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Minimum pause between outbound frames regardless of baud rate.
pub const MIN_INTER_FRAME_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub port: String,
    pub baudrate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 9600,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.port.is_empty() {
            return Err(ConfigValidationError::config("port must not be empty"));
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baudrate) {
            return Err(ConfigValidationError::config(format!(
                "baudrate {} is not one of {:?}",
                self.baudrate, SUPPORTED_BAUD_RATES
            )));
        }
        Ok(())
    }

    /// Duration of one 10-bit character (start + 8 data + stop) at the
    /// configured baud rate.
    pub fn char_time(&self) -> Duration {
        Duration::from_secs_f64(10.0 / self.baudrate as f64)
    }

    /// The standard 3.5-character inter-frame gap, floored at 10 ms for
    /// high baud rates where the raw gap would be unmeasurably small.
    pub fn inter_frame_delay(&self) -> Duration {
        self.char_time().mul_f64(3.5).max(MIN_INTER_FRAME_DELAY)
    }

    pub fn serial_port_info(&self) -> String {
        format!(
            "{} ({} baud, {} data bits, {} parity, {} stop bits)",
            self.port, self.baudrate, self.data_bits, self.parity, self.stop_bits
        )
    }
}
