use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use config::{Config as ConfigBuilder, ConfigError, Environment, File};

use crate::errors::ConfigValidationError;

use super::{LogConfig, ProtocolConfig, SerialConfig};

/// Complete client configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Serial line settings
    pub serial: SerialConfig,

    /// Transaction timing, retries and leniency flags
    pub protocol: ProtocolConfig,

    /// Logging configuration
    pub logging: LogConfig,
}

impl Config {
    /// Environment variable prefix
    const ENV_PREFIX: &'static str = "MODBUS_RTU";

    /// Build configuration from environment variables (MODBUS_RTU_*) over
    /// built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from a specific file, with environment variables
    /// as overrides.
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.serial.validate()?;
        self.protocol.validate()?;
        self.logging.validate()?;

        // A deadline shorter than the mandated inter-frame silence can
        // never see a response.
        let floor = self.serial.char_time().mul_f64(3.5);
        if self.protocol.timeout < floor {
            return Err(ConfigValidationError::config(format!(
                "timeout {:?} is below 3.5 character times ({:?}) at {} baud",
                self.protocol.timeout, floor, self.serial.baudrate
            )));
        }

        Ok(())
    }

    /// The pause enforced between outbound frames: the configured value
    /// when present, otherwise 3.5 character times, never below 10 ms.
    pub fn inter_frame_delay(&self) -> Duration {
        self.protocol
            .inter_frame_delay
            .unwrap_or_else(|| self.serial.inter_frame_delay())
            .max(super::serial::MIN_INTER_FRAME_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    #[serial_test::serial]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baudrate, 9600);
        assert_eq!(config.protocol.unit_id_default, 1);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_override() {
        std::env::set_var("MODBUS_RTU_SERIAL__BAUDRATE", "19200");
        let config = Config::load().unwrap();
        assert_eq!(config.serial.baudrate, 19200);
        std::env::remove_var("MODBUS_RTU_SERIAL__BAUDRATE");
    }

    #[test]
    #[serial_test::serial]
    fn test_file_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");

        fs::write(
            &config_path,
            r#"
            serial:
              port: "/dev/ttyAMA0"
              baudrate: 115200
            protocol:
              timeout: "500ms"
              retries: 1
              lenient_crc: true
            logging:
              level: "debug"
            "#,
        )
        .unwrap();

        let config = Config::from_file(config_path).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baudrate, 115200);
        assert_eq!(config.protocol.timeout, Duration::from_millis(500));
        assert_eq!(config.protocol.retries, 1);
        assert!(config.protocol.lenient_crc);
        assert!(config.protocol.lenient_function_code); // untouched default
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    #[serial_test::serial]
    fn test_timeout_below_char_time_floor() {
        let mut config = Config::default();
        config.serial.baudrate = 1200;
        config.protocol.timeout = Duration::from_millis(20);
        assert!(config.validate().is_err());

        config.protocol.timeout = Duration::from_millis(100);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial_test::serial]
    fn test_inter_frame_delay_override() {
        let mut config = Config::default();
        assert!(config.inter_frame_delay() >= Duration::from_millis(10));

        config.protocol.inter_frame_delay = Some(Duration::from_millis(2));
        assert_eq!(config.inter_frame_delay(), Duration::from_millis(10));

        config.protocol.inter_frame_delay = Some(Duration::from_millis(50));
        assert_eq!(config.inter_frame_delay(), Duration::from_millis(50));
    }
}
