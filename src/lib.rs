pub mod client;
pub mod codec;
pub mod config;
pub mod crc;
pub mod errors;
pub mod logging;
pub mod probe;
pub mod tracker;
pub mod transaction;
pub mod transport;
mod utils;

pub use client::Client;
pub use codec::{Request, Response, Tolerance};
pub use config::{ClientConfig, LogConfig, ProtocolConfig, SerialConfig};
pub use config::{DataBits, Parity, StopBits};
pub use crc::CrcVariant;
pub use errors::{
    ClientError, ConfigValidationError, ErrorKind, ExceptionCode, FrameError, SerialErrorKind,
    TransportError,
};
pub use logging::setup_logging;
pub use probe::{available_ports, detect, DetectedDevice, DEFAULT_BAUD_SCAN, DEFAULT_UNIT_SCAN};
pub use tracker::{DeviceSnapshot, DeviceState, StateTracker};
pub use transaction::{TransactionEngine, TransactionOptions};
pub use transport::{SerialAdapter, SerialPortAdapter};
