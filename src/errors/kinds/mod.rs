mod exception_code;
mod io_operation;
mod serial_error;

pub use exception_code::ExceptionCode;
pub use io_operation::IoOperation;
pub use serial_error::SerialErrorKind;
