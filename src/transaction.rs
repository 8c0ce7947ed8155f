//! The transaction engine: one request/response round-trip on the wire,
//! including pacing, progressive reads, validation and retries.
//!
//! A transaction is build -> flush -> pace -> send -> settle ->
//! progressive read -> parse, wrapped in a retry loop with exponential
//! backoff and a per-attempt deadline that widens on every retry.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::codec::{self, Decoded, Request, Tolerance, MAX_FRAME_SIZE};
use crate::crc::CrcVariant;
use crate::errors::{ClientError, FrameError};
use crate::transport::SerialAdapter;
use crate::utils::next_transaction_id;

/// Poll interval while waiting for bytes to arrive.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Floor for the post-send settle time. Waveshare boards routinely need
/// most of this before the first byte appears, whatever the baud rate.
const MIN_SETTLE: Duration = Duration::from_millis(100);

/// Timing and retry policy for one transaction.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Deadline for the first attempt; widens by 50% per retry.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub retries: u8,
    /// Parser leniency, from the client configuration.
    pub tolerance: Tolerance,
}

/// Drives transactions over one serial adapter.
///
/// The engine is not itself synchronized; the client facade keeps it
/// behind an exclusive lock so only one transaction is ever in flight
/// per port.
pub struct TransactionEngine {
    adapter: Box<dyn SerialAdapter>,
    port: String,
    baudrate: u32,
    inter_frame_delay: Duration,
    last_send: Option<Instant>,
}

impl TransactionEngine {
    pub fn new(
        adapter: Box<dyn SerialAdapter>,
        port: String,
        baudrate: u32,
        inter_frame_delay: Duration,
    ) -> Self {
        Self {
            adapter,
            port,
            baudrate,
            inter_frame_delay,
            last_send: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.adapter.is_open()
    }

    pub fn close(&mut self) {
        self.adapter.close();
    }

    /// Runs one transaction to completion, retrying per `options`.
    ///
    /// An exception reply is a completed transaction and comes back as
    /// `Ok` with [`codec::Response::Exception`]; only transport, timeout,
    /// CRC and protocol failures enter the retry loop.
    pub async fn execute(
        &mut self,
        unit_id: u8,
        request: &Request,
        function: u8,
        options: &TransactionOptions,
    ) -> Result<Decoded, ClientError> {
        let frame = request.encode_as(unit_id, function)?;
        let id = next_transaction_id();

        for attempt in 0..=options.retries {
            if attempt > 0 {
                let backoff = Duration::from_secs_f64(0.1 * f64::powi(2.0, attempt as i32 - 1));
                debug!(
                    "Transaction {:x}: backing off {:?} before attempt {}",
                    id,
                    backoff,
                    attempt + 1
                );
                sleep(backoff).await;
            }
            let attempt_timeout = options.timeout.mul_f64(1.5f64.powi(attempt as i32));

            match self
                .attempt(unit_id, request, function, &frame, attempt, attempt_timeout, &options.tolerance)
                .await
            {
                Ok(decoded) => {
                    if attempt > 0 {
                        debug!("Transaction {:x}: recovered on attempt {}", id, attempt + 1);
                    }
                    return Ok(decoded);
                }
                Err(error) if error.is_retriable() && attempt < options.retries => {
                    warn!(
                        "Transaction {:x}: attempt {}/{} failed with [{}] {} (request={})",
                        id,
                        attempt + 1,
                        options.retries + 1,
                        error.kind(),
                        error,
                        hex::encode(&frame)
                    );
                }
                Err(error) => return Err(error),
            }
        }

        unreachable!("the final attempt always returns")
    }

    async fn attempt(
        &mut self,
        unit_id: u8,
        request: &Request,
        function: u8,
        frame: &[u8],
        attempt: u8,
        attempt_timeout: Duration,
        tolerance: &Tolerance,
    ) -> Result<Decoded, ClientError> {
        // Stale bytes from an earlier attempt must not leak into this one.
        self.adapter.flush_input()?;
        self.adapter.flush_output()?;

        if let Some(last_send) = self.last_send {
            let since = last_send.elapsed();
            if since < self.inter_frame_delay {
                sleep(self.inter_frame_delay - since).await;
            }
        }

        trace!(
            "TX {} unit={} fn={:#04X} frame={}",
            self.port,
            unit_id,
            function,
            hex::encode(frame)
        );
        self.adapter.write_all(frame)?;
        let sent_at = Instant::now();
        self.last_send = Some(sent_at);

        // Give the device one frame's flight time in each direction
        // before polling, stretched on retries for slow responders.
        let flight = 40.0 / self.baudrate as f64;
        let settle = Duration::from_secs_f64(2.0 * flight * (1.0 + 0.5 * attempt as f64));
        sleep(settle.max(MIN_SETTLE)).await;

        let deadline = sent_at + attempt_timeout;
        let buf = self.read_until(request, deadline, attempt_timeout, sent_at).await?;

        trace!("RX {} unit={} frame={}", self.port, unit_id, hex::encode(&buf));

        let decoded = codec::parse_response(&buf, unit_id, function, request, tolerance)
            .map_err(|error| {
                warn!(
                    "Invalid response on {}: [{}] {} (request={} response={})",
                    self.port,
                    error.kind(),
                    error,
                    hex::encode(frame),
                    hex::encode(&buf)
                );
                error
            })?;

        if decoded.crc_variant != CrcVariant::Standard {
            debug!(
                "Response on {} accepted via CRC variant '{}'",
                self.port, decoded.crc_variant
            );
        }

        Ok(decoded)
    }

    /// Accumulates bytes until the response is structurally complete or
    /// the attempt deadline passes.
    async fn read_until(
        &mut self,
        request: &Request,
        deadline: Instant,
        limit: Duration,
        sent_at: Instant,
    ) -> Result<Vec<u8>, ClientError> {
        let mut buf: Vec<u8> = Vec::with_capacity(MAX_FRAME_SIZE);

        loop {
            if let Some(total) = request.expected_response_len(&buf) {
                if buf.len() >= total {
                    buf.truncate(total);
                    return Ok(buf);
                }
            }

            let room = MAX_FRAME_SIZE.saturating_sub(buf.len());
            if room == 0 {
                return Err(FrameError::TooLong {
                    len: buf.len(),
                    max: MAX_FRAME_SIZE,
                }
                .into());
            }

            if Instant::now() >= deadline {
                debug!(
                    "Read deadline passed on {} with {} bytes buffered: {}",
                    self.port,
                    buf.len(),
                    hex::encode(&buf)
                );
                return Err(ClientError::Timeout {
                    elapsed: sent_at.elapsed(),
                    limit,
                });
            }

            let available = self.adapter.bytes_available()?;
            if available == 0 {
                sleep(IDLE_POLL).await;
                continue;
            }

            let chunk = self.adapter.read_available(room)?;
            buf.extend_from_slice(&chunk);
        }
    }
}
