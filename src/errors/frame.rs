use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes - {details}")]
    TooShort { len: usize, details: String },

    #[error("Frame too long: {len} bytes exceeds {max}")]
    TooLong { len: usize, max: usize },

    #[error("Byte count mismatch: declared {declared}, frame carries {actual} data bytes")]
    ByteCountMismatch { declared: usize, actual: usize },

    #[error("CRC error: calculated={calculated:04X}, received={received:04X}, frame={frame_hex}")]
    Crc {
        calculated: u16,
        received: u16,
        frame_hex: String,
    },

    #[error("Unit ID mismatch: expected {expected}, received {received}")]
    UnitIdMismatch { expected: u8, received: u8 },

    #[error("Function code mismatch: requested {requested:#04X}, received {received:#04X}")]
    FunctionMismatch { requested: u8, received: u8 },

    #[error("Write echo mismatch: {details}, frame={frame_hex}")]
    EchoMismatch { details: String, frame_hex: String },
}
