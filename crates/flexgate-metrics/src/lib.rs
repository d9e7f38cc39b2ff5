//! Metrics for the FLEX paging gateway.
//!
//! Every metric the gateway records is declared once as a [`Metric`] constant
//! in [`metric_defs`], so names and label keys cannot drift between the call
//! sites and the exporter. The `metrics` crate is re-exported for convenience.
//!
//! # Example
//!
//! ```rust
//! use flexgate_metrics::{labels, metric_defs, metrics};
//!
//! metrics::counter!(
//!     metric_defs::REQUESTS.name,
//!     &labels::request("tcp", "success")
//! )
//! .increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use flexgate_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const SENT: Metric = Metric::counter("flexgate.example.sent")
///     .with_description("Pages sent")
///     .with_unit(Unit::Count)
///     .with_labels(&["frontend"]);
///
/// assert_eq!(SENT.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name.
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// A counter named `name`.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// A gauge named `name`.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// A histogram named `name`.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the gateway.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Front Ends
    // ========================================================================

    /// Requests handled by a front end.
    ///
    /// Labels: frontend (`tcp`, `http`), status (`success`, `rejected`, `failed`, ...)
    pub const REQUESTS: Metric = Metric::counter("flexgate.frontend.requests")
        .with_description("Requests handled by a front end")
        .with_unit(Unit::Count)
        .with_labels(&["frontend", "status"]);

    /// Connections currently being served.
    pub const ACTIVE_CONNECTIONS: Metric = Metric::gauge("flexgate.frontend.active_connections")
        .with_description("Connections currently being served")
        .with_unit(Unit::Count);

    // ========================================================================
    // Transmission
    // ========================================================================

    /// Pipeline runs by result.
    ///
    /// Labels: result (`success`, `validation_error`, `encoding_error`, `transport_error`, `protocol_error`)
    pub const TRANSMISSIONS: Metric = Metric::counter("flexgate.pipeline.transmissions")
        .with_description("Transmission pipeline runs by result")
        .with_unit(Unit::Count)
        .with_labels(&["result"]);

    /// Wall time of one pipeline run.
    pub const TRANSMISSION_DURATION: Metric = Metric::histogram("flexgate.pipeline.duration_ms")
        .with_description("Wall time of one transmission pipeline run in milliseconds")
        .with_unit(Unit::Milliseconds);

    /// Size of encoded payloads.
    pub const PAYLOAD_SIZE: Metric = Metric::histogram("flexgate.pipeline.payload_bytes")
        .with_description("Size of encoded FLEX payloads in bytes")
        .with_unit(Unit::Bytes);

    /// EMR bursts sent.
    ///
    /// Labels: result (`success`, `failed`)
    pub const EMR_BURSTS: Metric = Metric::counter("flexgate.pipeline.emr_bursts")
        .with_description("EMR synchronisation bursts sent")
        .with_unit(Unit::Count)
        .with_labels(&["result"]);

    // ========================================================================
    // Device
    // ========================================================================

    /// AT command retries.
    ///
    /// Labels: outcome (`ERROR`, `TIMEOUT`, `INVALID`)
    pub const AT_RETRIES: Metric = Metric::counter("flexgate.device.at_retries")
        .with_description("AT command attempts that were retried")
        .with_unit(Unit::Count)
        .with_labels(&["outcome"]);

    /// Outer binary send attempts that failed.
    ///
    /// Labels: stage
    pub const SEND_FAILURES: Metric = Metric::counter("flexgate.device.send_failures")
        .with_description("Binary send attempts that failed")
        .with_unit(Unit::Count)
        .with_labels(&["stage"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &REQUESTS,
        &ACTIVE_CONNECTIONS,
        &TRANSMISSIONS,
        &TRANSMISSION_DURATION,
        &PAYLOAD_SIZE,
        &EMR_BURSTS,
        &AT_RETRIES,
        &SEND_FAILURES,
    ];
}

/// Label helpers.
pub mod labels {
    /// Labels for [`super::metric_defs::REQUESTS`].
    pub fn request(frontend: &'static str, status: &'static str) -> [(&'static str, &'static str); 2] {
        [("frontend", frontend), ("status", status)]
    }

    /// Single `result` label.
    pub fn result(result: &'static str) -> [(&'static str, &'static str); 1] {
        [("result", result)]
    }
}

/// Describes all gateway metrics. Call once at startup after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install the Prometheus exporter listening on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
