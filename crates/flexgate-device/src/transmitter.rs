//! Radio configuration and the binary send sub-protocol.
//!
//! After the radio is configured, each send attempt runs the whole sequence:
//!
//! 1. best-effort `AT` ping
//! 2. `AT+SEND=<n>`, expecting `+SEND: READY`
//! 3. the payload in [`CHUNK_SIZE`] chunks, [`CHUNK_DELAY`] apart, within
//!    [`DATA_SEND_TIMEOUT`]
//! 4. drain, then [`TRANSMIT_SETTLE`] for the frame to go out
//! 5. a final `OK`
//!
//! A failure anywhere restarts the sequence from step 1; a half-streamed
//! payload leaves the device in a state a single command retry cannot fix.

use flexgate_at_protocol::{
    AtCommand, ResponseOutcome, SendFailure, CHUNK_DELAY, CHUNK_SIZE, DATA_SEND_TIMEOUT,
    SEND_ATTEMPTS, SEND_READY_MARKER, TRANSMIT_SETTLE,
};
use flexgate_metrics::{metric_defs, metrics};
use tracing::{debug, info, trace, warn};

use crate::error::{DeviceError, DeviceResult};
use crate::executor::CommandExecutor;
use crate::port::AtPort;
use crate::reader::read_response;

/// Radio settings for one transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioParameters {
    /// Carrier frequency in Hz.
    pub frequency_hz: u64,
    /// Transmit power level (2-20).
    pub power: u8,
}

impl RadioParameters {
    /// Parameters from a frequency in Hz.
    pub fn from_hz(frequency_hz: u64, power: u8) -> Self {
        RadioParameters {
            frequency_hz,
            power,
        }
    }

    /// Carrier frequency in MHz.
    pub fn frequency_mhz(&self) -> f64 {
        self.frequency_hz as f64 / 1_000_000.0
    }
}

/// Drives one payload onto the air.
#[derive(Debug, Clone, Default)]
pub struct MessageTransmitter {
    executor: CommandExecutor,
}

impl MessageTransmitter {
    /// Transmitter sending control commands through `executor`.
    pub fn new(executor: CommandExecutor) -> Self {
        MessageTransmitter { executor }
    }

    /// Set frequency and power. Either failing is fatal, and an out-of-range
    /// power level is refused before anything is written.
    pub fn configure<P: AtPort + ?Sized>(
        &self,
        port: &mut P,
        params: &RadioParameters,
    ) -> DeviceResult<()> {
        let power = AtCommand::power(params.power)?;
        debug!(
            "Transmitter: configuring {:.4} MHz, power {}",
            params.frequency_mhz(),
            params.power
        );
        self.executor
            .execute_acknowledged(port, &AtCommand::frequency_hz(params.frequency_hz))?;
        self.executor.execute_acknowledged(port, &power)?;
        Ok(())
    }

    /// Configure the radio and send `payload`.
    pub fn transmit<P: AtPort + ?Sized>(
        &self,
        port: &mut P,
        params: &RadioParameters,
        payload: &[u8],
    ) -> DeviceResult<()> {
        self.configure(port, params)?;
        self.send_binary(port, payload)
    }

    /// Run the send sequence up to [`SEND_ATTEMPTS`] times.
    pub fn send_binary<P: AtPort + ?Sized>(&self, port: &mut P, payload: &[u8]) -> DeviceResult<()> {
        let mut last = SendFailure::NotReady;

        for attempt in 1..=SEND_ATTEMPTS {
            debug!(
                "Transmitter: send attempt {}/{} ({} bytes)",
                attempt,
                SEND_ATTEMPTS,
                payload.len()
            );

            match self.attempt(port, payload) {
                Ok(()) => {
                    info!("Transmitter: {} bytes transmitted", payload.len());
                    return Ok(());
                }
                Err(failure) => {
                    last = failure;
                    warn!("Transmitter: attempt {} failed: {}", attempt, failure);
                    metrics::counter!(metric_defs::SEND_FAILURES.name, "stage" => failure.as_str())
                        .increment(1);
                    if attempt < SEND_ATTEMPTS {
                        port.pause(failure.rule().backoff);
                    }
                }
            }
        }

        Err(DeviceError::TransmissionFailed {
            attempts: SEND_ATTEMPTS,
            last,
        })
    }

    fn attempt<P: AtPort + ?Sized>(&self, port: &mut P, payload: &[u8]) -> Result<(), SendFailure> {
        if let Err(e) = self.executor.execute(port, &AtCommand::Attention) {
            debug!("Transmitter: reset ping failed, continuing: {}", e);
        }

        self.arm(port, payload.len())?;
        self.stream(port, payload)?;

        if let Err(e) = port.drain() {
            debug!("Transmitter: drain failed: {}", e);
        }
        port.pause(TRANSMIT_SETTLE);

        let response = read_response(port);
        if response.outcome != ResponseOutcome::Ok {
            debug!("Transmitter: final response {}", response.outcome);
            return Err(SendFailure::NotConfirmed);
        }
        Ok(())
    }

    fn arm<P: AtPort + ?Sized>(&self, port: &mut P, length: usize) -> Result<(), SendFailure> {
        let command = AtCommand::Send { length };
        if let Err(e) = port.flush_buffers() {
            debug!("Transmitter: flush failed: {}", e);
        }

        debug!("AT -> {}", command);
        if let Err(e) = port.write_all(&command.encode()) {
            debug!("Transmitter: write failed: {}", e);
            return Err(SendFailure::WriteFailed);
        }
        if let Err(e) = port.drain() {
            debug!("Transmitter: drain failed: {}", e);
        }

        let response = read_response(port);
        let ready = matches!(response.outcome, ResponseOutcome::Data | ResponseOutcome::Ok)
            && response.data_contains(SEND_READY_MARKER);
        if !ready {
            debug!(
                "Transmitter: device not ready ({}, {:?})",
                response.outcome, response.data_line
            );
            return Err(SendFailure::NotReady);
        }
        Ok(())
    }

    fn stream<P: AtPort + ?Sized>(&self, port: &mut P, payload: &[u8]) -> Result<(), SendFailure> {
        let started = port.now();
        let mut sent = 0;

        while sent < payload.len() {
            let end = (sent + CHUNK_SIZE).min(payload.len());
            match port.write(&payload[sent..end]) {
                Ok(0) => {
                    debug!("Transmitter: link accepted no bytes at {}", sent);
                    return Err(SendFailure::StreamAborted);
                }
                Ok(n) => sent += n,
                Err(e) => {
                    debug!("Transmitter: write failed at {}: {}", sent, e);
                    return Err(SendFailure::StreamAborted);
                }
            }
            trace!("Transmitter: sent {}/{} bytes", sent, payload.len());

            if port.now().duration_since(started) > DATA_SEND_TIMEOUT {
                debug!("Transmitter: streaming exceeded {:?}", DATA_SEND_TIMEOUT);
                return Err(SendFailure::StreamAborted);
            }
            port.pause(CHUNK_DELAY);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedPort;
    use std::time::Duration;

    fn params() -> RadioParameters {
        RadioParameters::from_hz(916_000_000, 10)
    }

    #[test]
    fn test_full_sequence() {
        let mut port = ScriptedPort::responsive();
        let log = port.handle();
        let payload: Vec<u8> = (0..100).collect();

        MessageTransmitter::default()
            .transmit(&mut port, &params(), &payload)
            .unwrap();

        assert_eq!(
            log.commands(),
            vec!["AT+FREQ=916.0000", "AT+POWER=10", "AT", "AT+SEND=100"]
        );
        assert_eq!(log.payloads(), vec![payload]);

        // Four chunks, each followed by the chunk delay, then the settle period
        let pauses = log.pauses();
        assert_eq!(pauses.iter().filter(|d| **d == CHUNK_DELAY).count(), 4);
        assert!(pauses.contains(&TRANSMIT_SETTLE));
    }

    #[test]
    fn test_ready_then_ok_accepted() {
        let mut port = ScriptedPort::with_responder(|line| {
            if line.starts_with("AT+SEND=") {
                Some(b"+SEND: READY\r\nOK\r\n".to_vec())
            } else {
                Some(b"OK\r\n".to_vec())
            }
        });
        let log = port.handle();
        MessageTransmitter::default()
            .send_binary(&mut port, &[0xA5, 0x5A, 0xA5, 0x5A])
            .unwrap();
        assert_eq!(log.payloads(), vec![vec![0xA5, 0x5A, 0xA5, 0x5A]]);
    }

    #[test]
    fn test_not_ready_retries_whole_sequence() {
        let mut port = ScriptedPort::with_responder(|line| {
            if line.starts_with("AT+SEND=") {
                Some(b"ERROR\r\n".to_vec())
            } else {
                Some(b"OK\r\n".to_vec())
            }
        });
        let log = port.handle();
        let err = MessageTransmitter::default()
            .send_binary(&mut port, &[1, 2, 3])
            .unwrap_err();

        assert!(matches!(
            err,
            DeviceError::TransmissionFailed {
                attempts: 3,
                last: SendFailure::NotReady
            }
        ));
        assert_eq!(log.count_command("AT+SEND=3"), 3);
        assert_eq!(log.count_command("AT"), 3);
        let backoffs = log
            .pauses()
            .into_iter()
            .filter(|d| *d == Duration::from_secs(2))
            .count();
        assert_eq!(backoffs, 2);
        assert!(log.payloads().is_empty());
    }

    #[test]
    fn test_unconfirmed_transmission_retried() {
        let mut port = ScriptedPort::responsive().with_payload_reply(b"ERROR\r\n");
        let log = port.handle();
        let err = MessageTransmitter::default()
            .send_binary(&mut port, &[7; 40])
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::TransmissionFailed {
                last: SendFailure::NotConfirmed,
                ..
            }
        ));
        assert_eq!(log.payloads().len(), 3);
    }

    #[test]
    fn test_stream_failure_restarts_sequence() {
        let mut port = ScriptedPort::responsive().drop_payload_after(40);
        let log = port.handle();
        let payload: Vec<u8> = (0..100).collect();

        MessageTransmitter::default()
            .send_binary(&mut port, &payload)
            .unwrap();

        // The dropped attempt is redone from the ping, after the 2 s backoff
        assert_eq!(log.commands(), vec!["AT", "AT+SEND=100", "AT", "AT+SEND=100"]);
        assert_eq!(log.payloads(), vec![payload]);
        assert!(log.pauses().contains(&Duration::from_secs(2)));
    }

    #[test]
    fn test_slow_stream_hits_ceiling() {
        // Two chunks at 11 s each overrun the 20 s streaming limit
        let mut port = ScriptedPort::responsive().with_write_delay(Duration::from_secs(11));
        let log = port.handle();

        let err = MessageTransmitter::default()
            .send_binary(&mut port, &[0x55; 2 * CHUNK_SIZE])
            .unwrap_err();

        assert!(matches!(
            err,
            DeviceError::TransmissionFailed {
                attempts: 3,
                last: SendFailure::StreamAborted
            }
        ));
        assert_eq!(log.count_command("AT+SEND=64"), 3);
        let backoffs = log
            .pauses()
            .into_iter()
            .filter(|d| *d == Duration::from_secs(2))
            .count();
        assert_eq!(backoffs, 2);
    }

    #[test]
    fn test_invalid_power_refused_before_writing() {
        let mut port = ScriptedPort::responsive();
        let log = port.handle();
        let err = MessageTransmitter::default()
            .transmit(&mut port, &RadioParameters::from_hz(916_000_000, 21), &[1])
            .unwrap_err();
        assert!(matches!(err, DeviceError::Command(_)));
        assert!(log.is_untouched());
    }

    #[test]
    fn test_configure_failure_is_fatal() {
        let mut port = ScriptedPort::with_responder(|line| {
            if line.starts_with("AT+POWER") {
                Some(b"ERROR\r\n".to_vec())
            } else {
                Some(b"OK\r\n".to_vec())
            }
        });
        let log = port.handle();
        let err = MessageTransmitter::new(CommandExecutor::with_max_attempts(2))
            .transmit(&mut port, &params(), &[1])
            .unwrap_err();
        assert!(matches!(err, DeviceError::Command(_)));
        assert_eq!(log.count_command("AT+SEND=1"), 0);
    }

    #[test]
    fn test_radio_parameters_from_hz() {
        let p = RadioParameters::from_hz(929_612_500, 5);
        assert!((p.frequency_mhz() - 929.6125).abs() < 1e-9);
        assert_eq!(p.power, 5);
    }
}
