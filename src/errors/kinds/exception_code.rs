/// Exception code echoed by a device in an exception response.
///
/// Codes 1 through 4 are the ones field devices actually send; everything
/// else passes through verbatim as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Other(u8),
}

impl ExceptionCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function (01)"),
            Self::IllegalDataAddress => write!(f, "illegal data address (02)"),
            Self::IllegalDataValue => write!(f, "illegal data value (03)"),
            Self::ServerDeviceFailure => write!(f, "server device failure (04)"),
            Self::Other(code) => write!(f, "exception code {:02X}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_codes_round_trip() {
        for code in 1..=11u8 {
            assert_eq!(ExceptionCode::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_named_codes() {
        assert_eq!(
            ExceptionCode::from_code(0x02),
            ExceptionCode::IllegalDataAddress
        );
        assert_eq!(ExceptionCode::from_code(0x0B), ExceptionCode::Other(0x0B));
    }
}
