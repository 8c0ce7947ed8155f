mod client;
mod config;
mod frame;
mod kinds;
mod transport;

pub use kinds::ExceptionCode;
pub use kinds::IoOperation;
pub use kinds::SerialErrorKind;

pub use client::ClientError;
pub use client::ErrorKind;
pub use config::ConfigValidationError;
pub use frame::FrameError;
pub use transport::TransportError;
