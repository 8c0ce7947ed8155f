mod client;
mod logging;
mod protocol;
mod serial;
mod types;

pub use client::Config as ClientConfig;
pub use logging::Config as LogConfig;
pub use protocol::Config as ProtocolConfig;
pub use serial::Config as SerialConfig;
pub use serial::{MIN_INTER_FRAME_DELAY, SUPPORTED_BAUD_RATES};
pub use types::{DataBits, Parity, StopBits};
