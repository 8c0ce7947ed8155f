//! Frame codec: request builder and response parser for Modbus RTU.
//!
//! The parser is deliberately forgiving where field hardware is known to
//! misbehave. Waveshare relay and analog boards echo wrong function
//! codes, answer unit 0, and stamp frames with off-spec checksums; each
//! tolerance is gated by a flag in [`Tolerance`] and logged when it
//! fires, so a clean bus stays strict.

use tracing::warn;

use crate::crc::{self, CrcVariant};
use crate::errors::{ClientError, ExceptionCode, FrameError};

/// Smallest complete frame: unit + function + one payload byte + CRC.
pub const MIN_FRAME_SIZE: usize = 5;

/// Largest RTU frame the codec will accept.
pub const MAX_FRAME_SIZE: usize = 256;

pub mod function {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

    /// Waveshare alias for `READ_HOLDING_REGISTERS`.
    pub const VENDOR_READ_HOLDING_REGISTERS: u8 = 0x43;
}

/// Maps vendor-extension function codes onto the standard ones they alias.
/// 0x41..=0x44 mirror the reads, 0x65..=0x68 mirror the writes.
pub fn canonical_function(code: u8) -> u8 {
    match code {
        0x41..=0x44 => code - 0x40,
        0x65 => function::WRITE_SINGLE_COIL,
        0x66 => function::WRITE_SINGLE_REGISTER,
        0x67 => function::WRITE_MULTIPLE_COILS,
        0x68 => function::WRITE_MULTIPLE_REGISTERS,
        other => other,
    }
}

/// Which deviations from the standard the parser accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tolerance {
    /// Accept non-standard CRC variants on read responses.
    pub crc: bool,
    /// Accept whitelisted function-code echoes.
    pub function_code: bool,
    /// Accept broadcast or mismatched unit-ID echoes.
    pub unit_id: bool,
}

/// One Modbus request, unit-agnostic. Encoding adds the unit ID and CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl Request {
    /// The standard function code for this request.
    pub fn function(&self) -> u8 {
        match self {
            Self::ReadCoils { .. } => function::READ_COILS,
            Self::ReadDiscreteInputs { .. } => function::READ_DISCRETE_INPUTS,
            Self::ReadHoldingRegisters { .. } => function::READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters { .. } => function::READ_INPUT_REGISTERS,
            Self::WriteSingleCoil { .. } => function::WRITE_SINGLE_COIL,
            Self::WriteSingleRegister { .. } => function::WRITE_SINGLE_REGISTER,
            Self::WriteMultipleCoils { .. } => function::WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters { .. } => function::WRITE_MULTIPLE_REGISTERS,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::ReadCoils { .. }
                | Self::ReadDiscreteInputs { .. }
                | Self::ReadHoldingRegisters { .. }
                | Self::ReadInputRegisters { .. }
        )
    }

    /// Checks quantity bounds and that the addressed span stays inside the
    /// 16-bit register space.
    pub fn validate(&self) -> Result<(), ClientError> {
        let (address, quantity, limit, what): (u16, usize, usize, &str) = match self {
            Self::ReadCoils { address, quantity }
            | Self::ReadDiscreteInputs { address, quantity } => {
                (*address, *quantity as usize, 2000, "coil read")
            }
            Self::ReadHoldingRegisters { address, quantity }
            | Self::ReadInputRegisters { address, quantity } => {
                (*address, *quantity as usize, 125, "register read")
            }
            Self::WriteSingleCoil { .. } | Self::WriteSingleRegister { .. } => return Ok(()),
            Self::WriteMultipleCoils { address, values } => {
                (*address, values.len(), 1968, "coil write")
            }
            Self::WriteMultipleRegisters { address, values } => {
                (*address, values.len(), 123, "register write")
            }
        };

        if quantity == 0 || quantity > limit {
            return Err(ClientError::invalid_argument(format!(
                "{} quantity {} out of range 1..={}",
                what, quantity, limit
            )));
        }
        if address as usize + quantity > 0x1_0000 {
            return Err(ClientError::invalid_argument(format!(
                "{} span {}+{} exceeds the 16-bit address space",
                what, address, quantity
            )));
        }

        Ok(())
    }

    /// Encodes a complete frame with the standard function code.
    pub fn encode(&self, unit_id: u8) -> Result<Vec<u8>, ClientError> {
        self.encode_as(unit_id, self.function())
    }

    /// Encodes a complete frame under an explicit function code. Used by
    /// the vendor-read fallback, which reissues a holding-register read
    /// as 0x43.
    pub fn encode_as(&self, unit_id: u8, function: u8) -> Result<Vec<u8>, ClientError> {
        if unit_id > 247 {
            return Err(ClientError::invalid_argument(format!(
                "unit ID {} outside 0..=247",
                unit_id
            )));
        }
        self.validate()?;

        let mut frame = Vec::with_capacity(MAX_FRAME_SIZE);
        frame.push(unit_id);
        frame.push(function);

        match self {
            Self::ReadCoils { address, quantity }
            | Self::ReadDiscreteInputs { address, quantity }
            | Self::ReadHoldingRegisters { address, quantity }
            | Self::ReadInputRegisters { address, quantity } => {
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(&quantity.to_be_bytes());
            }
            Self::WriteSingleCoil { address, value } => {
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(if *value { &[0xFF, 0x00] } else { &[0x00, 0x00] });
            }
            Self::WriteSingleRegister { address, value } => {
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(&value.to_be_bytes());
            }
            Self::WriteMultipleCoils { address, values } => {
                let packed = pack_bits(values);
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(&(values.len() as u16).to_be_bytes());
                frame.push(packed.len() as u8);
                frame.extend_from_slice(&packed);
            }
            Self::WriteMultipleRegisters { address, values } => {
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(&(values.len() as u16).to_be_bytes());
                frame.push((values.len() * 2) as u8);
                for value in values {
                    frame.extend_from_slice(&value.to_be_bytes());
                }
            }
        }

        crc::append(&mut frame);
        Ok(frame)
    }

    /// Total response length, once enough bytes have arrived to decide.
    ///
    /// Exception frames are always 5 bytes. Read responses carry their
    /// length in the byte-count field; write echoes are fixed at 8.
    pub fn expected_response_len(&self, so_far: &[u8]) -> Option<usize> {
        if so_far.len() < 2 {
            return None;
        }
        if so_far[1] & 0x80 != 0 {
            return Some(5);
        }
        if self.is_read() {
            if so_far.len() < 3 {
                return None;
            }
            Some(3 + so_far[2] as usize + 2)
        } else {
            Some(8)
        }
    }
}

/// A parsed device reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The device answered the request; `payload` is the PDU after the
    /// function code (byte count included for reads, echo for writes).
    Normal { function: u8, payload: Vec<u8> },
    /// The device answered with an exception. Definitive - never retried.
    Exception { function: u8, code: ExceptionCode },
}

/// Parse result plus the checksum dialect that accepted the frame.
/// Anything other than [`CrcVariant::Standard`] counts as a CRC bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub response: Response,
    pub crc_variant: CrcVariant,
}

/// Parses and validates a response frame against the request that
/// produced it.
///
/// Structural impossibilities surface as protocol errors, checksum
/// failures as CRC errors, and whitelisted deviations are accepted under
/// `tolerance` with a warning.
pub fn parse_response(
    frame: &[u8],
    expected_unit: u8,
    function_sent: u8,
    request: &Request,
    tolerance: &Tolerance,
) -> Result<Decoded, ClientError> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            len: frame.len(),
            details: format!("response to function {:#04X}", function_sent),
        }
        .into());
    }
    if frame.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLong {
            len: frame.len(),
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    let unit_received = frame[0];
    let function_received = frame[1];

    // Exception responses are validated strictly: a single payload byte
    // carrying the exception code, standard CRC only.
    if function_received & 0x80 != 0 {
        if frame.len() != 5 {
            return Err(FrameError::ByteCountMismatch {
                declared: 1,
                actual: frame.len() - 4,
            }
            .into());
        }
        if !crc::validate(frame) {
            return Err(crc_error(frame).into());
        }
        check_unit_id(expected_unit, unit_received, tolerance)?;

        return Ok(Decoded {
            response: Response::Exception {
                function: function_received & 0x7F,
                code: ExceptionCode::from_code(frame[2]),
            },
            crc_variant: CrcVariant::Standard,
        });
    }

    // Structural shape first, so a consistent byte count is established
    // before any CRC leniency applies.
    if request.is_read() {
        let declared = frame[2] as usize;
        if frame.len() != 3 + declared + 2 {
            return Err(FrameError::ByteCountMismatch {
                declared,
                actual: frame.len().saturating_sub(5),
            }
            .into());
        }
    } else if frame.len() != 8 {
        return Err(FrameError::ByteCountMismatch {
            declared: 4,
            actual: frame.len() - 4,
        }
        .into());
    }

    let crc_variant = if crc::validate(frame) {
        CrcVariant::Standard
    } else if tolerance.crc && request.is_read() {
        match crc::validate_lenient(frame) {
            Some(variant) => {
                warn!(
                    "Accepting response with non-standard CRC variant '{}': frame={}",
                    variant,
                    hex::encode(frame)
                );
                variant
            }
            None => return Err(crc_error(frame).into()),
        }
    } else {
        return Err(crc_error(frame).into());
    };

    check_unit_id(expected_unit, unit_received, tolerance)?;

    if function_received != function_sent {
        let whitelisted = tolerance.function_code
            && tolerated_function_pair(function_sent, function_received, request.is_read());
        if !whitelisted {
            return Err(FrameError::FunctionMismatch {
                requested: function_sent,
                received: function_received,
            }
            .into());
        }
        warn!(
            "Accepting response with function code {:#04X} for request {:#04X}: frame={}",
            function_received,
            function_sent,
            hex::encode(frame)
        );
    }

    let payload = frame[2..frame.len() - 2].to_vec();

    if !request.is_read() {
        verify_write_echo(request, &payload, frame)?;
    }

    Ok(Decoded {
        response: Response::Normal {
            function: function_sent,
            payload,
        },
        crc_variant,
    })
}

fn crc_error(frame: &[u8]) -> FrameError {
    let (calculated, received) = match crc::split_frame(frame) {
        Some((body, received)) => (crc::crc16(body), received),
        None => (0, 0),
    };
    FrameError::Crc {
        calculated,
        received,
        frame_hex: hex::encode(frame),
    }
}

fn check_unit_id(expected: u8, received: u8, tolerance: &Tolerance) -> Result<(), ClientError> {
    if received == expected {
        return Ok(());
    }
    if tolerance.unit_id {
        warn!(
            "Accepting response from unit {} while expecting unit {}",
            received, expected
        );
        return Ok(());
    }
    Err(FrameError::UnitIdMismatch { expected, received }.into())
}

/// The function-code compatibility whitelist.
///
/// Vendor aliases (0x41..=0x44, 0x65..=0x68) map onto the operation they
/// mirror; reads additionally tolerate a 0x00 echo and off-by-one
/// neighbours, which covers the holding/input (0x03/0x04) and
/// coil/discrete (0x01/0x02) confusion seen on relay boards.
fn tolerated_function_pair(sent: u8, received: u8, is_read: bool) -> bool {
    let canonical_sent = canonical_function(sent);
    let canonical_received = canonical_function(received);

    if canonical_sent == canonical_received {
        return true;
    }
    if is_read {
        if received == 0x00 {
            return true;
        }
        return canonical_received == canonical_sent.wrapping_add(1)
            || canonical_sent == canonical_received.wrapping_add(1);
    }
    false
}

fn verify_write_echo(
    request: &Request,
    payload: &[u8],
    frame: &[u8],
) -> Result<(), ClientError> {
    let expected: [u8; 4] = match request {
        Request::WriteSingleCoil { address, value } => {
            let [hi, lo] = address.to_be_bytes();
            [hi, lo, if *value { 0xFF } else { 0x00 }, 0x00]
        }
        Request::WriteSingleRegister { address, value } => {
            let [ahi, alo] = address.to_be_bytes();
            let [vhi, vlo] = value.to_be_bytes();
            [ahi, alo, vhi, vlo]
        }
        Request::WriteMultipleCoils { address, values } => {
            let [ahi, alo] = address.to_be_bytes();
            let [qhi, qlo] = (values.len() as u16).to_be_bytes();
            [ahi, alo, qhi, qlo]
        }
        Request::WriteMultipleRegisters { address, values } => {
            let [ahi, alo] = address.to_be_bytes();
            let [qhi, qlo] = (values.len() as u16).to_be_bytes();
            [ahi, alo, qhi, qlo]
        }
        _ => return Ok(()),
    };

    if payload != expected.as_slice() {
        return Err(FrameError::EchoMismatch {
            details: format!(
                "expected {}, device echoed {}",
                hex::encode(expected),
                hex::encode(payload)
            ),
            frame_hex: hex::encode(frame),
        }
        .into());
    }

    Ok(())
}

/// Unpacks a read-coils/discrete-inputs payload (byte count + bitmap,
/// LSB first within each byte), truncated to `quantity` bits.
pub fn unpack_bits(payload: &[u8], quantity: u16) -> Result<Vec<bool>, ClientError> {
    if payload.is_empty() {
        return Err(FrameError::TooShort {
            len: 0,
            details: "empty bit payload".into(),
        }
        .into());
    }
    let data = &payload[1..];
    let needed = (quantity as usize + 7) / 8;
    if data.len() < needed {
        return Err(FrameError::TooShort {
            len: payload.len(),
            details: format!("bit payload carries {} bytes, {} needed", data.len(), needed),
        }
        .into());
    }

    Ok((0..quantity as usize)
        .map(|bit| data[bit / 8] >> (bit % 8) & 1 == 1)
        .collect())
}

/// Unpacks a register-read payload (byte count + big-endian u16 pairs).
pub fn unpack_registers(payload: &[u8]) -> Result<Vec<u16>, ClientError> {
    if payload.is_empty() {
        return Err(FrameError::TooShort {
            len: 0,
            details: "empty register payload".into(),
        }
        .into());
    }
    let declared = payload[0] as usize;
    let data = &payload[1..];
    if declared % 2 != 0 || data.len() != declared {
        return Err(FrameError::ByteCountMismatch {
            declared,
            actual: data.len(),
        }
        .into());
    }

    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Packs coil values into a bitmap, LSB first within each byte.
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; (values.len() + 7) / 8];
    for (bit, value) in values.iter().enumerate() {
        if *value {
            packed[bit / 8] |= 1 << (bit % 8);
        }
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn strict() -> Tolerance {
        Tolerance::default()
    }

    fn lenient() -> Tolerance {
        Tolerance {
            crc: true,
            function_code: true,
            unit_id: true,
        }
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        crc::append(&mut frame);
        frame
    }

    #[test]
    fn test_encode_read_single_coil() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 1,
        };
        assert_eq!(
            request.encode(1).unwrap(),
            vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x01, 0xFD, 0xCA]
        );
    }

    #[test]
    fn test_encode_write_single_coil_on() {
        let request = Request::WriteSingleCoil {
            address: 0,
            value: true,
        };
        assert_eq!(
            request.encode(1).unwrap(),
            vec![0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]
        );
    }

    #[test]
    fn test_encode_read_holding_register() {
        let request = Request::ReadHoldingRegisters {
            address: 0,
            quantity: 1,
        };
        assert_eq!(
            request.encode(1).unwrap(),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
    }

    #[test]
    fn test_encode_write_multiple_coils() {
        let request = Request::WriteMultipleCoils {
            address: 0x0013,
            values: vec![true, false, true, true, false, false, true, true, true, false],
        };
        let frame = request.encode(0x11).unwrap();
        // 10 coils -> quantity 0x000A, 2 data bytes, bits LSB-first.
        assert_eq!(&frame[..9], &[0x11, 0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]);
    }

    #[test]
    fn test_quantity_bounds() {
        let cases = [
            Request::ReadCoils {
                address: 0,
                quantity: 2001,
            },
            Request::ReadCoils {
                address: 0,
                quantity: 0,
            },
            Request::ReadHoldingRegisters {
                address: 0,
                quantity: 126,
            },
            Request::WriteMultipleCoils {
                address: 0,
                values: vec![false; 1969],
            },
            Request::WriteMultipleRegisters {
                address: 0,
                values: vec![0; 124],
            },
        ];

        for request in cases {
            let err = request.encode(1).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", request);
        }
    }

    #[test]
    fn test_unit_id_range() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 1,
        };
        assert!(request.encode(247).is_ok());
        assert_eq!(
            request.encode(248).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_address_span_overflow() {
        let request = Request::ReadCoils {
            address: 0xFFFF,
            quantity: 2,
        };
        assert_eq!(
            request.encode(1).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_expected_response_len() {
        let read = Request::ReadCoils {
            address: 0,
            quantity: 8,
        };
        assert_eq!(read.expected_response_len(&[0x01]), None);
        assert_eq!(read.expected_response_len(&[0x01, 0x01]), None);
        assert_eq!(read.expected_response_len(&[0x01, 0x01, 0x01]), Some(6));
        assert_eq!(read.expected_response_len(&[0x01, 0x81]), Some(5));

        let write = Request::WriteSingleCoil {
            address: 0,
            value: true,
        };
        assert_eq!(write.expected_response_len(&[0x01]), None);
        assert_eq!(write.expected_response_len(&[0x01, 0x05]), Some(8));
        assert_eq!(write.expected_response_len(&[0x01, 0x85]), Some(5));
    }

    #[test]
    fn test_parse_read_coils_response() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 1,
        };
        let frame = [0x01, 0x01, 0x01, 0x00, 0x51, 0x88];

        let decoded = parse_response(&frame, 1, 0x01, &request, &strict()).unwrap();
        assert_eq!(decoded.crc_variant, CrcVariant::Standard);
        match decoded.response {
            Response::Normal { function, payload } => {
                assert_eq!(function, 0x01);
                assert_eq!(unpack_bits(&payload, 1).unwrap(), vec![false]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_parse_exception_response() {
        let request = Request::ReadHoldingRegisters {
            address: 0,
            quantity: 1,
        };
        let frame = [0x01, 0x83, 0x02, 0xC0, 0xF1];

        let decoded = parse_response(&frame, 1, 0x03, &request, &strict()).unwrap();
        assert_eq!(
            decoded.response,
            Response::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress,
            }
        );
    }

    #[test]
    fn test_parse_swapped_crc() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 1,
        };
        // Same frame as the clean case but with the CRC trailer swapped,
        // as some Waveshare revisions send it.
        let frame = [0x01, 0x01, 0x01, 0x00, 0x88, 0x51];

        let err = parse_response(&frame, 1, 0x01, &request, &strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crc);

        let decoded = parse_response(&frame, 1, 0x01, &request, &lenient()).unwrap();
        assert_eq!(decoded.crc_variant, CrcVariant::Swapped);
        assert!(matches!(decoded.response, Response::Normal { .. }));
    }

    #[test]
    fn test_crc_leniency_never_applies_to_writes() {
        let request = Request::WriteSingleCoil {
            address: 0,
            value: true,
        };
        let mut frame = vec![0x01, 0x05, 0x00, 0x00, 0xFF, 0x00];
        let crc = crc::crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes()); // swapped on purpose

        let err = parse_response(&frame, 1, 0x05, &request, &lenient()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crc);
    }

    #[test]
    fn test_function_code_tolerance() {
        let request = Request::ReadHoldingRegisters {
            address: 0,
            quantity: 1,
        };

        // Echoes seen in the wild for a 0x03 request.
        for echo in [0x04u8, 0x02, 0x00, 0x43] {
            let frame = framed(&[0x01, echo, 0x02, 0x00, 0x2A]);
            let decoded = parse_response(&frame, 1, 0x03, &request, &lenient())
                .unwrap_or_else(|e| panic!("echo {:#04X} rejected: {}", echo, e));
            match decoded.response {
                Response::Normal { function, payload } => {
                    assert_eq!(function, 0x03);
                    assert_eq!(unpack_registers(&payload).unwrap(), vec![42]);
                }
                other => panic!("unexpected response: {:?}", other),
            }

            let err = parse_response(&frame, 1, 0x03, &request, &strict()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol, "echo {:#04X}", echo);
        }

        // 0x06 is not a neighbour of 0x03 and stays rejected even leniently.
        let frame = framed(&[0x01, 0x06, 0x02, 0x00, 0x2A]);
        assert!(parse_response(&frame, 1, 0x03, &request, &lenient()).is_err());
    }

    #[test]
    fn test_unit_id_tolerance() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 1,
        };
        for unit in [0u8, 2] {
            let frame = framed(&[unit, 0x01, 0x01, 0x00]);

            let err = parse_response(&frame, 1, 0x01, &request, &strict()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol);

            assert!(parse_response(&frame, 1, 0x01, &request, &lenient()).is_ok());
        }
    }

    #[test]
    fn test_byte_count_mismatch() {
        let request = Request::ReadCoils {
            address: 0,
            quantity: 8,
        };
        // Declares 5 data bytes but carries 1.
        let frame = framed(&[0x01, 0x01, 0x05, 0x00]);

        let err = parse_response(&frame, 1, 0x01, &request, &strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_write_echo_mismatch() {
        let request = Request::WriteSingleCoil {
            address: 0,
            value: true,
        };
        // Device echoes OFF for a write of ON.
        let frame = framed(&[0x01, 0x05, 0x00, 0x00, 0x00, 0x00]);

        let err = parse_response(&frame, 1, 0x05, &request, &strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_write_multiple_echo() {
        let request = Request::WriteMultipleRegisters {
            address: 0x0001,
            values: vec![0x000A, 0x0102],
        };
        let frame = framed(&[0x01, 0x10, 0x00, 0x01, 0x00, 0x02]);

        let decoded = parse_response(&frame, 1, 0x10, &request, &strict()).unwrap();
        assert!(matches!(decoded.response, Response::Normal { .. }));
    }

    #[test]
    fn test_unpack_registers() {
        assert_eq!(unpack_registers(&[0x02, 0x00, 0x2A]).unwrap(), vec![42]);
        assert_eq!(
            unpack_registers(&[0x04, 0x12, 0x34, 0x56, 0x78]).unwrap(),
            vec![0x1234, 0x5678]
        );
        assert!(unpack_registers(&[0x03, 0x00, 0x2A]).is_err());
    }

    #[test]
    fn test_unpack_bits_truncates_to_quantity() {
        let bits = unpack_bits(&[0x01, 0b0000_0101], 3).unwrap();
        assert_eq!(bits, vec![true, false, true]);
    }

    #[test]
    fn test_pack_bits_round_trip() {
        let values = vec![true, false, true, true, false, false, true, true, true, false];
        let packed = pack_bits(&values);
        assert_eq!(packed, vec![0xCD, 0x01]);

        let mut payload = vec![packed.len() as u8];
        payload.extend_from_slice(&packed);
        assert_eq!(unpack_bits(&payload, values.len() as u16).unwrap(), values);
    }

    #[test]
    fn test_canonical_function_vendor_aliases() {
        assert_eq!(canonical_function(0x41), 0x01);
        assert_eq!(canonical_function(0x43), 0x03);
        assert_eq!(canonical_function(0x65), 0x05);
        assert_eq!(canonical_function(0x68), 0x10);
        assert_eq!(canonical_function(0x03), 0x03);
    }
}
