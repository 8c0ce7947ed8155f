//! Auto-detection: sweep ports, baud rates and unit IDs until something
//! answers.
//!
//! The probe issues a one-coil read per (port, baud, unit) tuple with a
//! single attempt and no fallbacks, so a full sweep stays cheap. The
//! first Normal response wins.

use serde::Serialize;
use tracing::{debug, info};

use crate::client::Client;
use crate::config::{ClientConfig, SerialConfig};
use crate::errors::TransportError;
use crate::transport::{SerialAdapter, SerialPortAdapter};

/// Scan order for baud rates, fastest first.
pub const DEFAULT_BAUD_SCAN: [u32; 5] = [115200, 57600, 38400, 19200, 9600];

/// Scan order for unit IDs; 0 (broadcast) last, some boards answer it.
pub const DEFAULT_UNIT_SCAN: [u8; 4] = [1, 2, 3, 0];

/// A working (port, baud, unit) combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedDevice {
    pub port: String,
    pub baudrate: u32,
    pub unit_id: u8,
}

/// Serial ports the platform reports.
pub fn available_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

/// Sweeps the (port, baud, unit) space and returns the first working
/// combination, or `None` when the cross product is exhausted. No port
/// is left open, hit or miss.
pub async fn detect(
    ports: &[String],
    bauds: &[u32],
    units: &[u8],
    base: &ClientConfig,
) -> Option<DetectedDevice> {
    detect_with(
        |serial| {
            SerialPortAdapter::open(serial).map(|adapter| Box::new(adapter) as Box<dyn SerialAdapter>)
        },
        ports,
        bauds,
        units,
        base,
    )
    .await
}

/// [`detect`] with an injectable port opener.
pub async fn detect_with<F>(
    mut open_adapter: F,
    ports: &[String],
    bauds: &[u32],
    units: &[u8],
    base: &ClientConfig,
) -> Option<DetectedDevice>
where
    F: FnMut(&SerialConfig) -> Result<Box<dyn SerialAdapter>, TransportError>,
{
    for port in ports {
        for &baudrate in bauds {
            let mut config = base.clone();
            config.serial.port = port.clone();
            config.serial.baudrate = baudrate;
            config.protocol.retries = 0;
            config.protocol.state_tracking = false;
            config.protocol.vendor_read_fallback = false;

            let adapter = match open_adapter(&config.serial) {
                Ok(adapter) => adapter,
                Err(error) => {
                    debug!("Probe cannot open {} at {} baud: {}", port, baudrate, error);
                    continue;
                }
            };
            let client = Client::with_adapter(adapter, config);

            for &unit_id in units {
                match client.read_coils(unit_id, 0, 1).await {
                    Ok(_) => {
                        info!(
                            "Probe found unit {} on {} at {} baud",
                            unit_id, port, baudrate
                        );
                        client.close().await;
                        return Some(DetectedDevice {
                            port: port.clone(),
                            baudrate,
                            unit_id,
                        });
                    }
                    Err(error) => {
                        debug!(
                            "Probe miss on {} at {} baud, unit {}: [{}]",
                            port,
                            baudrate,
                            unit_id,
                            error.kind()
                        );
                    }
                }
            }

            client.close().await;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::transport::mock::MockAdapter;

    fn base_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.protocol.timeout = Duration::from_millis(200);
        config
    }

    #[tokio::test]
    async fn test_probe_finds_slow_baud_after_fast_miss() {
        let opens = Arc::new(AtomicUsize::new(0));
        let opens_counter = Arc::clone(&opens);

        let ports = vec!["/dev/pts/1".to_string()];
        let found = detect_with(
            move |serial| {
                opens_counter.fetch_add(1, Ordering::SeqCst);
                // Only the 9600-baud personality answers.
                let script = if serial.baudrate == 9600 {
                    vec![Some(vec![0x01, 0x01, 0x01, 0x00, 0x51, 0x88])]
                } else {
                    vec![None]
                };
                Ok(Box::new(MockAdapter::new(script)) as Box<dyn SerialAdapter>)
            },
            &ports,
            &[115200, 9600],
            &[1],
            &base_config(),
        )
        .await;

        assert_eq!(
            found,
            Some(DetectedDevice {
                port: "/dev/pts/1".to_string(),
                baudrate: 9600,
                unit_id: 1,
            })
        );
        // One failed open+probe at 115200, then the hit.
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_probe_exhausts_cross_product() {
        let found = detect_with(
            |_serial| Ok(Box::new(MockAdapter::new(vec![None, None])) as Box<dyn SerialAdapter>),
            &["/dev/pts/7".to_string()],
            &[19200],
            &[1, 2],
            &base_config(),
        )
        .await;

        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_probe_skips_unopenable_ports() {
        let found = detect_with(
            |serial| {
                if serial.port == "/dev/bad" {
                    Err(TransportError::Serial {
                        kind: crate::errors::SerialErrorKind::OpenFailed,
                        port: serial.port.clone(),
                        details: "Device not found".into(),
                        source: None,
                    })
                } else {
                    Ok(Box::new(MockAdapter::new(vec![Some(vec![
                        0x01, 0x01, 0x01, 0x00, 0x51, 0x88,
                    ])])) as Box<dyn SerialAdapter>)
                }
            },
            &["/dev/bad".to_string(), "/dev/good".to_string()],
            &[9600],
            &[1],
            &base_config(),
        )
        .await;

        assert_eq!(found.unwrap().port, "/dev/good");
    }
}
