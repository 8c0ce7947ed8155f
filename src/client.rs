//! The client facade: typed Modbus operations over one serial port.
//!
//! Each operation is exactly one transaction. The facade owns the serial
//! adapter behind an exclusive lock (one transaction in flight per
//! port), applies the configured leniency flags, and feeds the state
//! tracker on every completed round-trip.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::codec::{self, function, Request, Response};
use crate::config::ClientConfig;
use crate::crc::CrcVariant;
use crate::errors::{ClientError, ErrorKind};
use crate::tracker::StateTracker;
use crate::transaction::{TransactionEngine, TransactionOptions};
use crate::transport::{SerialAdapter, SerialPortAdapter};

pub struct Client {
    engine: Mutex<TransactionEngine>,
    config: ClientConfig,
    tracker: Option<StateTracker>,
    open: AtomicBool,
}

impl Client {
    /// Opens the configured serial port and wraps it in a client.
    pub fn open(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let adapter = SerialPortAdapter::open(&config.serial)?;
        info!("Opened {}", config.serial.serial_port_info());
        Ok(Self::with_adapter(Box::new(adapter), config))
    }

    /// Builds a client over an already-open adapter. This is how the
    /// probe and platform integrations hand in their own port handling.
    pub fn with_adapter(adapter: Box<dyn SerialAdapter>, config: ClientConfig) -> Self {
        let engine = TransactionEngine::new(
            adapter,
            config.serial.port.clone(),
            config.serial.baudrate,
            config.inter_frame_delay(),
        );
        let tracker = config.protocol.state_tracking.then(StateTracker::new);

        Self {
            engine: Mutex::new(engine),
            config,
            tracker,
            open: AtomicBool::new(true),
        }
    }

    /// Shares an external tracker instead of the client-private one.
    /// No-op when state tracking is disabled in the configuration.
    pub fn with_tracker(mut self, tracker: StateTracker) -> Self {
        if self.config.protocol.state_tracking {
            self.tracker = Some(tracker);
        }
        self
    }

    /// Opens a client, runs `operate`, and closes the port on every exit
    /// path, error included.
    pub async fn scoped<T, F, Fut>(config: ClientConfig, operate: F) -> Result<T, ClientError>
    where
        F: FnOnce(Arc<Client>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let client = Arc::new(Self::open(config)?);
        let result = operate(Arc::clone(&client)).await;
        client.close().await;
        result
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tracker(&self) -> Option<&StateTracker> {
        self.tracker.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Closes the port. Idempotent; in-flight transactions finish first.
    pub async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.engine.lock().await.close();
            info!("Closed {}", self.config.serial.port);
        }
    }

    pub async fn read_coils(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::ReadCoils { address, quantity };
        let payload = self.run(unit, &request).await?;
        let values = codec::unpack_bits(&payload, quantity)?;
        self.track(|tracker| tracker.record_coils(self.port(), unit, self.baudrate(), address, &values));
        Ok(values)
    }

    pub async fn read_discrete_inputs(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::ReadDiscreteInputs { address, quantity };
        let payload = self.run(unit, &request).await?;
        let values = codec::unpack_bits(&payload, quantity)?;
        self.track(|tracker| {
            tracker.record_discrete_inputs(self.port(), unit, self.baudrate(), address, &values)
        });
        Ok(values)
    }

    pub async fn read_holding_registers(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::ReadHoldingRegisters { address, quantity };
        let payload = self.run(unit, &request).await?;
        let values = codec::unpack_registers(&payload)?;
        self.track(|tracker| {
            tracker.record_holding_registers(self.port(), unit, self.baudrate(), address, &values)
        });
        Ok(values)
    }

    pub async fn read_input_registers(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::ReadInputRegisters { address, quantity };
        let payload = self.run(unit, &request).await?;
        let values = codec::unpack_registers(&payload)?;
        self.track(|tracker| {
            tracker.record_input_registers(self.port(), unit, self.baudrate(), address, &values)
        });
        Ok(values)
    }

    /// Writes one coil; the device's echo is verified against the request.
    pub async fn write_single_coil(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        value: bool,
    ) -> Result<(), ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::WriteSingleCoil { address, value };
        self.run(unit, &request).await?;
        self.track(|tracker| tracker.record_coils(self.port(), unit, self.baudrate(), address, &[value]));
        Ok(())
    }

    pub async fn write_single_register(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        value: u16,
    ) -> Result<(), ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::WriteSingleRegister { address, value };
        self.run(unit, &request).await?;
        self.track(|tracker| {
            tracker.record_holding_registers(self.port(), unit, self.baudrate(), address, &[value])
        });
        Ok(())
    }

    pub async fn write_multiple_coils(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        values: &[bool],
    ) -> Result<(), ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::WriteMultipleCoils {
            address,
            values: values.to_vec(),
        };
        self.run(unit, &request).await?;
        self.track(|tracker| tracker.record_coils(self.port(), unit, self.baudrate(), address, values));
        Ok(())
    }

    pub async fn write_multiple_registers(
        &self,
        unit: impl Into<Option<u8>>,
        address: u16,
        values: &[u16],
    ) -> Result<(), ClientError> {
        let unit = self.unit_or_default(unit);
        let request = Request::WriteMultipleRegisters {
            address,
            values: values.to_vec(),
        };
        self.run(unit, &request).await?;
        self.track(|tracker| {
            tracker.record_holding_registers(self.port(), unit, self.baudrate(), address, values)
        });
        Ok(())
    }

    /// One transaction: lock the engine, execute with retries, apply the
    /// vendor fallback if configured, and feed the tracker.
    async fn run(&self, unit: u8, request: &Request) -> Result<Vec<u8>, ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        // Caller mistakes surface before anything is counted or sent.
        request.validate()?;

        let options = TransactionOptions {
            timeout: self.config.protocol.timeout,
            retries: self.config.protocol.retries,
            tolerance: self.config.protocol.tolerance(),
        };

        let mut engine = self.engine.lock().await;
        if !engine.is_open() {
            return Err(ClientError::NotConnected);
        }

        self.track(|tracker| tracker.record_request(self.port(), unit, self.baudrate()));

        let mut result = engine.execute(unit, request, request.function(), &options).await;

        if self.config.protocol.vendor_read_fallback
            && matches!(request, Request::ReadHoldingRegisters { .. })
            && matches!(&result, Err(error) if error.is_retriable())
        {
            info!(
                "Unit {} did not answer function {:#04X}; retrying with vendor function {:#04X}",
                unit,
                function::READ_HOLDING_REGISTERS,
                function::VENDOR_READ_HOLDING_REGISTERS
            );
            result = engine
                .execute(unit, request, function::VENDOR_READ_HOLDING_REGISTERS, &options)
                .await;
        }

        match result {
            Ok(decoded) => {
                if decoded.crc_variant != CrcVariant::Standard {
                    self.track(|tracker| {
                        tracker.record_crc_bypass(self.port(), unit, self.baudrate())
                    });
                }
                match decoded.response {
                    Response::Normal { payload, .. } => {
                        self.track(|tracker| {
                            tracker.record_success(self.port(), unit, self.baudrate())
                        });
                        Ok(payload)
                    }
                    Response::Exception { function, code } => {
                        let error = ClientError::Exception { function, code };
                        self.track(|tracker| {
                            tracker.record_error(
                                self.port(),
                                unit,
                                self.baudrate(),
                                &error.to_string(),
                                false,
                            )
                        });
                        Err(error)
                    }
                }
            }
            Err(error) => {
                self.track(|tracker| {
                    tracker.record_error(
                        self.port(),
                        unit,
                        self.baudrate(),
                        &error.to_string(),
                        error.kind() == ErrorKind::Timeout,
                    )
                });
                Err(error)
            }
        }
    }

    fn unit_or_default(&self, unit: impl Into<Option<u8>>) -> u8 {
        unit.into().unwrap_or(self.config.protocol.unit_id_default)
    }

    fn track(&self, record: impl FnOnce(&StateTracker)) {
        if let Some(tracker) = &self.tracker {
            record(tracker);
        }
    }

    fn port(&self) -> &str {
        &self.config.serial.port
    }

    fn baudrate(&self) -> u32 {
        self.config.serial.baudrate
    }
}
