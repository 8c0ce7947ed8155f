//! Byte-level port access behind a narrow trait.
//!
//! The transaction engine only ever sees [`SerialAdapter`]; the
//! `serialport`-backed implementation lives here, and tests script a
//! mock against the same trait.

use std::time::Duration;

use crate::config::SerialConfig;
use crate::errors::{SerialErrorKind, TransportError};

/// Low-level read timeout on the port itself. Short so `read_available`
/// returns promptly; pacing and deadlines live in the transaction engine.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Blocking byte-level access to a serial line.
///
/// Reads must return whatever is currently buffered (possibly nothing)
/// and never block past the low-level port timeout.
pub trait SerialAdapter: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn bytes_available(&mut self) -> Result<usize, TransportError>;
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;
    fn flush_input(&mut self) -> Result<(), TransportError>;
    fn flush_output(&mut self) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

/// [`SerialAdapter`] over a real port via the `serialport` crate.
pub struct SerialPortAdapter {
    port: Option<Box<dyn serialport::SerialPort>>,
    path: String,
}

impl SerialPortAdapter {
    /// Opens and configures the port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baudrate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .timeout(PORT_TIMEOUT)
            .open()?;

        Ok(Self {
            port: Some(port),
            path: config.port.clone(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, TransportError> {
        self.port.as_mut().ok_or_else(|| TransportError::Serial {
            kind: SerialErrorKind::Disconnected,
            port: self.path.clone(),
            details: "port is closed".into(),
            source: None,
        })
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        let written = port.write(data)?;
        if written < data.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.port_mut()?.bytes_to_read()? as usize)
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let port = self.port_mut()?;
        let available = port.bytes_to_read()? as usize;
        let wanted = available.min(max);
        if wanted == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; wanted];
        let read = port.read(&mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.port_mut()?.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn flush_output(&mut self) -> Result<(), TransportError> {
        self.port_mut()?.clear(serialport::ClearBuffer::Output)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        self.port = None;
    }
}
