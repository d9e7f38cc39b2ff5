//! Process startup: configuration, device pre-flight, listeners, shutdown.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flexgate_device::{DeviceError, DeviceInitializer, SerialLink};
use flexgate_flex::FlexEncoder;
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::{CredentialError, CredentialStore};
use crate::config::{ConfigError, GatewayConfig};
use crate::pipeline::{PipelineSettings, SerialOpener, TransmissionPipeline};
use crate::server::{bind_listeners, GatewayServer, ServerContext};

/// Command-line options that reach startup.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Configuration file.
    pub config_path: PathBuf,
    /// Skip the device entirely.
    pub debug: bool,
}

/// Startup failures, each with its own exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Invalid or unreadable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A listener could not bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address attempted.
        addr: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The credential file could not be loaded or created.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// The device failed the pre-flight check.
    #[error("FLEX device check failed: {0}")]
    Device(#[from] DeviceError),

    /// The metrics exporter could not start.
    #[error("Failed to start metrics exporter: {0}")]
    Metrics(String),

    /// The async runtime could not be built.
    #[error("Failed to start: {0}")]
    Runtime(#[from] io::Error),

    /// The signal handler could not be installed.
    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl StartupError {
    /// Process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Config(_) => 2,
            StartupError::Bind { .. } | StartupError::Metrics(_) => 3,
            StartupError::Credentials(_) => 4,
            StartupError::Device(_) => 5,
            StartupError::Runtime(_) | StartupError::Signal(_) => 1,
        }
    }
}

/// Run the gateway until SIGINT or SIGTERM.
pub fn run(options: &RunOptions) -> Result<(), StartupError> {
    let config = GatewayConfig::load(&options.config_path)?;
    config.validate()?;
    debug!(
        "Configuration: {}",
        serde_json::to_string(&config).unwrap_or_default()
    );

    if options.debug {
        info!("Debug mode: requests are validated and encoded, nothing is transmitted");
    } else {
        preflight(&config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, options.debug))
}

/// Open the device and run the handshake once, so a missing or silent
/// transmitter is reported before any listener starts.
pub fn preflight(config: &GatewayConfig) -> Result<(), StartupError> {
    let mut link = SerialLink::open(&config.flex_device, config.flex_baudrate)?;
    DeviceInitializer::default().initialize(&mut link)?;
    link.close();
    info!(
        "FLEX device {} answered the AT handshake",
        config.flex_device
    );
    Ok(())
}

async fn serve(config: GatewayConfig, debug: bool) -> Result<(), StartupError> {
    install_metrics(&config)?;
    flexgate_metrics::describe_metrics();

    let (tcp, http) = bind_listeners(&config).await?;

    let credentials = if config.http_enabled() {
        CredentialStore::load_or_create(&config.http_auth_credentials)?
    } else {
        CredentialStore::default()
    };

    let pipeline = TransmissionPipeline::new(
        Arc::new(FlexEncoder::new()),
        Arc::new(SerialOpener::new(
            config.flex_device.clone(),
            config.flex_baudrate,
        )),
        PipelineSettings {
            power: config.flex_power,
            default_frequency: config.default_frequency,
            debug,
        },
    );
    let context = Arc::new(ServerContext::new(pipeline, credentials));
    let server = GatewayServer::new(tcp, http, context);

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Shutdown signal received, stopping server");
        flag.store(false, Ordering::SeqCst);
    })?;

    server.run(running).await;
    Ok(())
}

fn install_metrics(config: &GatewayConfig) -> Result<(), StartupError> {
    let Some(addr) = config.metrics_address else {
        return Ok(());
    };

    #[cfg(feature = "prometheus")]
    {
        flexgate_metrics::install_prometheus(addr)
            .map_err(|e| StartupError::Metrics(e.to_string()))?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }
    #[cfg(not(feature = "prometheus"))]
    tracing::warn!(
        "METRICS_ADDRESS {} ignored: built without the prometheus feature",
        addr
    );

    Ok(())
}
