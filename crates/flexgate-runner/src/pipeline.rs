//! The transmission pipeline: validate, encode, drive the device.
//!
//! Every step is a gate; nothing reaches the radio unless the capcode is valid,
//! the frequency is in range, the encoder succeeded, and the link passed the
//! device handshake in the same call. The link is opened per request and
//! closed before [`TransmissionPipeline::process_message`] returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flexgate_device::{
    AtPort, DeviceError, DeviceInitializer, DeviceResult, MessageTransmitter, RadioParameters,
    SerialLink,
};
use flexgate_flex::{classify_capcode, FlexError, PayloadEncoder};
use flexgate_metrics::{labels, metric_defs, metrics};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Time after a successful transmission before the next one is preceded by an
/// EMR burst.
pub const EMR_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Synchronisation burst sent ahead of a message when EMR is due.
pub const EMR_BURST: [u8; 4] = [0xA5, 0x5A, 0xA5, 0x5A];

/// Lowest accepted carrier frequency in Hz.
pub const MIN_FREQUENCY_HZ: u64 = 1_000_000;

/// Highest accepted carrier frequency in Hz.
pub const MAX_FREQUENCY_HZ: u64 = 6_000_000_000;

/// Whether `hz` is an accepted carrier frequency.
pub fn frequency_in_range(hz: u64) -> bool {
    (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz)
}

// ============================================================================
// Requests and state
// ============================================================================

/// One page to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingRequest {
    /// Pager address.
    pub capcode: u64,
    /// Message text.
    pub message: String,
    /// Carrier frequency in Hz; 0 selects the configured default.
    pub frequency_hz: u64,
}

impl PagingRequest {
    /// A request for `capcode` on `frequency_hz` (0 for the default).
    pub fn new(capcode: u64, message: impl Into<String>, frequency_hz: u64) -> Self {
        PagingRequest {
            capcode,
            message: message.into(),
            frequency_hz,
        }
    }
}

/// Per-listener transmission history used for the EMR decision.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    last_transmission: Option<Instant>,
}

impl ConnectionState {
    /// State with no transmissions yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first successful transmission.
    pub fn is_first_message(&self) -> bool {
        self.last_transmission.is_none()
    }

    /// Time of the last successful transmission.
    pub fn last_transmission(&self) -> Option<Instant> {
        self.last_transmission
    }

    /// Whether an EMR burst must precede a transmission at `now`.
    pub fn emr_due(&self, now: Instant) -> bool {
        match self.last_transmission {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= EMR_INTERVAL,
        }
    }

    /// Record a successful transmission at `now`.
    pub fn record_success(&mut self, now: Instant) {
        self.last_transmission = Some(now);
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a request was not transmitted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The message text is empty.
    #[error("Message is empty")]
    EmptyMessage,

    /// The capcode is reserved or out of range.
    #[error("Invalid capcode: {0}")]
    InvalidCapcode(u64),

    /// The frequency is outside 1 MHz - 6 GHz.
    #[error("Frequency out of valid range: {0} Hz")]
    FrequencyOutOfRange(u64),

    /// The encoder rejected the message.
    #[error("Error encoding message ({}): {0}", .0.code())]
    Encoding(#[from] FlexError),

    /// The device could not be opened, initialized, or driven.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl PipelineError {
    /// Error class for logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            PipelineError::EmptyMessage
            | PipelineError::InvalidCapcode(_)
            | PipelineError::FrequencyOutOfRange(_) => "validation_error",
            PipelineError::Encoding(_) => "encoding_error",
            PipelineError::Device(e) if e.is_transport() => "transport_error",
            PipelineError::Device(_) => "protocol_error",
        }
    }

    /// Whether the request was rejected before any device access.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PipelineError::Device(_))
    }
}

// ============================================================================
// Device access
// ============================================================================

/// Opens the link to the transmitter.
pub trait LinkOpener: Send + Sync {
    /// Open a fresh link. Dropping it closes the device.
    fn open(&self) -> DeviceResult<Box<dyn AtPort + Send>>;
}

impl<F> LinkOpener for F
where
    F: Fn() -> DeviceResult<Box<dyn AtPort + Send>> + Send + Sync,
{
    fn open(&self) -> DeviceResult<Box<dyn AtPort + Send>> {
        self()
    }
}

/// Opens a [`SerialLink`] on a tty.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    path: String,
    baud: u32,
}

impl SerialOpener {
    /// Opener for `path` at `baud`.
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        SerialOpener {
            path: path.into(),
            baud,
        }
    }
}

impl LinkOpener for SerialOpener {
    fn open(&self) -> DeviceResult<Box<dyn AtPort + Send>> {
        Ok(Box::new(SerialLink::open(&self.path, self.baud)?))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Radio and mode settings shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Transmit power, already validated.
    pub power: u8,
    /// Frequency used when a request carries 0.
    pub default_frequency: u64,
    /// Validate and encode only; never touch the device.
    pub debug: bool,
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionReport {
    /// Encoded payload size in bytes.
    pub payload_len: usize,
    /// Frequency used, in Hz.
    pub frequency_hz: u64,
    /// An EMR burst was sent successfully ahead of the message.
    pub emr_sent: bool,
    /// The message went out over the air (false in debug mode).
    pub transmitted: bool,
}

/// Validates requests and drives the transmitter.
pub struct TransmissionPipeline {
    encoder: Arc<dyn PayloadEncoder>,
    opener: Arc<dyn LinkOpener>,
    initializer: DeviceInitializer,
    transmitter: MessageTransmitter,
    settings: PipelineSettings,
    device: Mutex<()>,
}

impl std::fmt::Debug for TransmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TransmissionPipeline {
    /// Pipeline encoding with `encoder` and reaching the device through
    /// `opener`.
    pub fn new(
        encoder: Arc<dyn PayloadEncoder>,
        opener: Arc<dyn LinkOpener>,
        settings: PipelineSettings,
    ) -> Self {
        TransmissionPipeline {
            encoder,
            opener,
            initializer: DeviceInitializer::default(),
            transmitter: MessageTransmitter::default(),
            settings,
            device: Mutex::new(()),
        }
    }

    /// Replace the handshake and send components.
    pub fn with_components(
        mut self,
        initializer: DeviceInitializer,
        transmitter: MessageTransmitter,
    ) -> Self {
        self.initializer = initializer;
        self.transmitter = transmitter;
        self
    }

    /// Pipeline settings.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one request to completion. Blocks for the whole device exchange.
    ///
    /// `state` is the calling listener's history; it is read for the EMR
    /// decision and updated only when the message was transmitted.
    pub fn process_message(
        &self,
        request: &PagingRequest,
        state: &Mutex<ConnectionState>,
    ) -> Result<TransmissionReport, PipelineError> {
        let started = Instant::now();
        let result = self.run(request, state);

        metrics::histogram!(metric_defs::TRANSMISSION_DURATION.name)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        let result_label = match &result {
            Ok(_) => "success",
            Err(e) => e.class(),
        };
        metrics::counter!(
            metric_defs::TRANSMISSIONS.name,
            &labels::result(result_label)
        )
        .increment(1);

        match &result {
            Ok(report) => info!(
                "Pipeline: capcode {} done ({} bytes, transmitted: {})",
                request.capcode, report.payload_len, report.transmitted
            ),
            Err(e) => warn!(
                "Pipeline: capcode {} failed [{}]: {}",
                request.capcode,
                e.class(),
                e
            ),
        }
        result
    }

    fn run(
        &self,
        request: &PagingRequest,
        state: &Mutex<ConnectionState>,
    ) -> Result<TransmissionReport, PipelineError> {
        debug!(
            "Pipeline: capcode {}, {} chars, frequency {} Hz",
            request.capcode,
            request.message.chars().count(),
            request.frequency_hz
        );

        if request.message.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        let kind =
            classify_capcode(request.capcode).ok_or(PipelineError::InvalidCapcode(request.capcode))?;
        debug!("Pipeline: capcode {} is {}", request.capcode, kind.as_str());

        let frequency_hz = match request.frequency_hz {
            0 => self.settings.default_frequency,
            hz => hz,
        };
        if !frequency_in_range(frequency_hz) {
            return Err(PipelineError::FrequencyOutOfRange(frequency_hz));
        }

        let payload = self.encoder.encode(&request.message, request.capcode)?;
        metrics::histogram!(metric_defs::PAYLOAD_SIZE.name).record(payload.len() as f64);
        debug!(
            "Pipeline: encoded {} bytes\n{}",
            payload.len(),
            payload.hex_dump()
        );

        let mut report = TransmissionReport {
            payload_len: payload.len(),
            frequency_hz,
            emr_sent: false,
            transmitted: false,
        };

        if self.settings.debug {
            info!("Pipeline: debug mode, transmission skipped");
            return Ok(report);
        }

        let params = RadioParameters::from_hz(frequency_hz, self.settings.power);
        let _device = self.device.lock();

        let mut link = self.opener.open()?;
        debug!(
            "Pipeline: link open, {:.6} MHz at power {}",
            params.frequency_mhz(),
            params.power
        );
        let outcome = self.drive(&mut *link, &params, payload.as_bytes(), state, &mut report);
        drop(link);
        debug!("Pipeline: link closed");

        outcome.map(|()| report)
    }

    fn drive(
        &self,
        link: &mut (dyn AtPort + Send),
        params: &RadioParameters,
        payload: &[u8],
        state: &Mutex<ConnectionState>,
        report: &mut TransmissionReport,
    ) -> Result<(), PipelineError> {
        self.initializer.initialize(link)?;

        let emr_due = state.lock().emr_due(Instant::now());
        if emr_due {
            debug!("Pipeline: sending EMR burst");
            match self.transmitter.transmit(link, params, &EMR_BURST) {
                Ok(()) => {
                    report.emr_sent = true;
                    metrics::counter!(metric_defs::EMR_BURSTS.name, &labels::result("success"))
                        .increment(1);
                }
                Err(e) => {
                    warn!("Pipeline: EMR burst failed, continuing: {}", e);
                    metrics::counter!(metric_defs::EMR_BURSTS.name, &labels::result("failed"))
                        .increment(1);
                }
            }
        }

        self.transmitter.transmit(link, params, payload)?;
        state.lock().record_success(Instant::now());
        report.transmitted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexgate_device::ScriptedPort;
    use flexgate_flex::{EncodedPayload, FlexEncoder, FlexResult};

    struct FixedEncoder(Vec<u8>);

    impl PayloadEncoder for FixedEncoder {
        fn encode(&self, _message: &str, _capcode: u64) -> FlexResult<EncodedPayload> {
            EncodedPayload::new(self.0.clone())
        }
    }

    fn settings(debug: bool) -> PipelineSettings {
        PipelineSettings {
            power: 10,
            default_frequency: 916_000_000,
            debug,
        }
    }

    fn unreachable_device() -> Arc<dyn LinkOpener> {
        Arc::new(|| -> DeviceResult<Box<dyn AtPort + Send>> {
            Err(DeviceError::UnsupportedBaudRate(0))
        })
    }

    #[test]
    fn test_frequency_bounds() {
        assert!(!frequency_in_range(999_999));
        assert!(frequency_in_range(1_000_000));
        assert!(frequency_in_range(6_000_000_000));
        assert!(!frequency_in_range(6_000_000_001));
    }

    #[test]
    fn test_emr_schedule() {
        let mut state = ConnectionState::new();
        let t0 = Instant::now();
        assert!(state.is_first_message());
        assert!(state.emr_due(t0));

        state.record_success(t0);
        assert!(!state.is_first_message());
        assert!(!state.emr_due(t0));
        assert!(!state.emr_due(t0 + EMR_INTERVAL - Duration::from_millis(1)));
        assert!(state.emr_due(t0 + EMR_INTERVAL));
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(PipelineError::EmptyMessage.class(), "validation_error");
        assert_eq!(PipelineError::InvalidCapcode(0).class(), "validation_error");
        assert_eq!(
            PipelineError::Encoding(FlexError::EmptyMessage).class(),
            "encoding_error"
        );
        assert_eq!(
            PipelineError::Device(DeviceError::UnsupportedBaudRate(1)).class(),
            "transport_error"
        );
        assert_eq!(
            PipelineError::Device(DeviceError::InitializationFailed { attempts: 10 }).class(),
            "protocol_error"
        );
    }

    #[test]
    fn test_validation_precedes_device() {
        let pipeline = TransmissionPipeline::new(
            Arc::new(FlexEncoder::new()),
            unreachable_device(),
            settings(false),
        );
        let state = Mutex::new(ConnectionState::new());

        let err = pipeline
            .process_message(&PagingRequest::new(0, "Hi", 0), &state)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidCapcode(0)));

        let err = pipeline
            .process_message(&PagingRequest::new(1_122_334, "Hi", 999_999), &state)
            .unwrap_err();
        assert!(matches!(err, PipelineError::FrequencyOutOfRange(999_999)));

        let err = pipeline
            .process_message(&PagingRequest::new(1_122_334, "", 0), &state)
            .unwrap_err();
        assert!(err.is_rejection());

        // Validation passed, so the device was reached
        let err = pipeline
            .process_message(&PagingRequest::new(1_122_334, "Hi", 0), &state)
            .unwrap_err();
        assert_eq!(err.class(), "transport_error");
        assert!(state.lock().is_first_message());
    }

    #[test]
    fn test_debug_mode_skips_device() {
        let pipeline = TransmissionPipeline::new(
            Arc::new(FlexEncoder::new()),
            unreachable_device(),
            settings(true),
        );
        let state = Mutex::new(ConnectionState::new());
        let report = pipeline
            .process_message(&PagingRequest::new(1_122_334, "Hello", 0), &state)
            .unwrap();

        assert!(!report.transmitted);
        assert!(!report.emr_sent);
        assert_eq!(report.frequency_hz, 916_000_000);
        assert!(state.lock().is_first_message());
    }

    #[test]
    fn test_first_message_sends_emr_then_payload() {
        let port = ScriptedPort::responsive();
        let log = port.handle();
        let slot = Mutex::new(Some(port));
        let opener = move || -> DeviceResult<Box<dyn AtPort + Send>> {
            match slot.lock().take() {
                Some(port) => Ok(Box::new(port)),
                None => Err(DeviceError::UnsupportedBaudRate(0)),
            }
        };

        let pipeline = TransmissionPipeline::new(
            Arc::new(FixedEncoder(vec![0x11; 40])),
            Arc::new(opener),
            settings(false),
        );
        let state = Mutex::new(ConnectionState::new());
        let report = pipeline
            .process_message(&PagingRequest::new(1_122_334, "Hello", 929_612_500), &state)
            .unwrap();

        assert!(report.transmitted);
        assert!(report.emr_sent);
        assert_eq!(log.payloads(), vec![EMR_BURST.to_vec(), vec![0x11; 40]]);
        assert_eq!(log.count_command("AT+FREQ=929.6125"), 2);
        assert_eq!(log.count_command("AT+POWER=10"), 2);
        assert!(!state.lock().is_first_message());
    }

    #[test]
    fn test_encoding_failure_reported() {
        let pipeline = TransmissionPipeline::new(
            Arc::new(FixedEncoder(vec![0; 2000])),
            unreachable_device(),
            settings(false),
        );
        let state = Mutex::new(ConnectionState::new());
        let err = pipeline
            .process_message(&PagingRequest::new(1_122_334, "Hi", 0), &state)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Encoding(FlexError::PayloadTooLarge { .. })
        ));
    }
}
