//! FLEX paging gateway.
//!
//! Accepts paging requests on a raw TCP port (`CAPCODE|MESSAGE|FREQUENCY`) and
//! an authenticated HTTP/JSON port, and drives a FLEX-FSK-TX transmitter over
//! its serial AT interface for each one.
//!
//! The [`TransmissionPipeline`] is the only path to the radio. Front ends parse
//! and authenticate, then hand a [`PagingRequest`] to the pipeline on the
//! blocking pool; the pipeline holds a device lock for the whole exchange.

pub mod auth;
pub mod config;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod startup;
pub mod tcp;

pub use auth::{CredentialError, CredentialStore};
pub use config::{ConfigError, GatewayConfig};
pub use pipeline::{
    ConnectionState, LinkOpener, PagingRequest, PipelineError, PipelineSettings, SerialOpener,
    TransmissionPipeline, TransmissionReport,
};
pub use server::{GatewayServer, ServerContext};
pub use startup::{RunOptions, StartupError};
