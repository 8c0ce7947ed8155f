use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Tolerance;
use crate::errors::ConfigValidationError;

/// Transaction-level knobs: timing, retries, and which device quirks to
/// tolerate. Leniency flags all default to the safe side except
/// function-code tolerance, which is on because mismatched echoes are by
/// far the most common Waveshare deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Per-attempt deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Unit ID used when the caller does not name one.
    pub unit_id_default: u8,

    /// Additional attempts after the first failure.
    pub retries: u8,

    /// Minimum pause between outbound frames. Computed from the baud
    /// rate when absent.
    #[serde(with = "humantime_serde::option")]
    pub inter_frame_delay: Option<Duration>,

    /// Accept non-standard CRC variants on read responses.
    pub lenient_crc: bool,

    /// Accept whitelisted function-code echoes.
    pub lenient_function_code: bool,

    /// Accept broadcast or mismatched unit-ID echoes.
    pub lenient_unit_id: bool,

    /// Keep per-unit snapshots and counters.
    pub state_tracking: bool,

    /// After a failed holding-register read, retry once with the
    /// Waveshare 0x43 variant.
    pub vendor_read_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            unit_id_default: 1,
            retries: 2,
            inter_frame_delay: None,
            lenient_crc: false,
            lenient_function_code: true,
            lenient_unit_id: false,
            state_tracking: true,
            vendor_read_fallback: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.timeout.is_zero() {
            return Err(ConfigValidationError::config("timeout must be non-zero"));
        }
        if self.unit_id_default > 247 {
            return Err(ConfigValidationError::config(format!(
                "unit_id_default {} outside 0..=247",
                self.unit_id_default
            )));
        }
        Ok(())
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            crc: self.lenient_crc,
            function_code: self.lenient_function_code,
            unit_id: self.lenient_unit_id,
        }
    }
}
