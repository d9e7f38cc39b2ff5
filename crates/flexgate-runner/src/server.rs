//! Accept loop for both front ends.
//!
//! One task multiplexes the two listeners with a [`SHUTDOWN_POLL`] timeout so
//! the shutdown flag is seen promptly. Each connection gets its own task; the
//! pipeline runs on the blocking pool.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flexgate_metrics::{metric_defs, metrics};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::auth::CredentialStore;
use crate::config::GatewayConfig;
use crate::pipeline::{ConnectionState, PagingRequest, PipelineError, TransmissionPipeline, TransmissionReport};
use crate::startup::StartupError;
use crate::{http, tcp};

/// How often the accept loop checks the shutdown flag.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

/// How long a client has to deliver its request before the connection is
/// dropped. Bounds every connection task, so shutdown never waits on an idle
/// peer.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The two front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frontend {
    /// Raw `CAPCODE|MESSAGE|FREQUENCY` lines.
    Tcp,
    /// HTTP/JSON with basic auth.
    Http,
}

impl Frontend {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frontend::Tcp => "tcp",
            Frontend::Http => "http",
        }
    }
}

/// A request that did not complete.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The pipeline rejected or failed the request.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The blocking task panicked or was cancelled.
    #[error("Transmission task failed: {0}")]
    Task(#[from] JoinError),
}

impl SubmitError {
    /// Request status label.
    pub fn status(&self) -> &'static str {
        match self {
            SubmitError::Pipeline(e) if e.is_rejection() => "rejected",
            _ => "failed",
        }
    }
}

/// State shared by every connection.
#[derive(Debug)]
pub struct ServerContext {
    pipeline: TransmissionPipeline,
    credentials: CredentialStore,
    tcp_state: Mutex<ConnectionState>,
    http_state: Mutex<ConnectionState>,
    read_timeout: Duration,
}

impl ServerContext {
    /// Context around `pipeline`, authenticating HTTP with `credentials`.
    pub fn new(pipeline: TransmissionPipeline, credentials: CredentialStore) -> Self {
        ServerContext {
            pipeline,
            credentials,
            tcp_state: Mutex::new(ConnectionState::new()),
            http_state: Mutex::new(ConnectionState::new()),
            read_timeout: CLIENT_READ_TIMEOUT,
        }
    }

    /// Replace [`CLIENT_READ_TIMEOUT`].
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Time a client has to send its request.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// HTTP credentials.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Transmission history of one front end.
    pub fn state(&self, frontend: Frontend) -> &Mutex<ConnectionState> {
        match frontend {
            Frontend::Tcp => &self.tcp_state,
            Frontend::Http => &self.http_state,
        }
    }

    /// Run `request` through the pipeline on the blocking pool.
    pub async fn submit(
        self: &Arc<Self>,
        frontend: Frontend,
        request: PagingRequest,
    ) -> Result<TransmissionReport, SubmitError> {
        let context = Arc::clone(self);
        let report = tokio::task::spawn_blocking(move || {
            context
                .pipeline
                .process_message(&request, context.state(frontend))
        })
        .await??;
        Ok(report)
    }
}

/// Bind the enabled listeners.
pub async fn bind_listeners(
    config: &GatewayConfig,
) -> Result<(Option<TcpListener>, Option<TcpListener>), StartupError> {
    let tcp = if config.serial_enabled() {
        let listener = bind(config.listen_addr(config.serial_listen_port)).await?;
        info!("Serial TCP server listening on {}", listener.local_addr()?);
        Some(listener)
    } else {
        info!("Serial TCP server disabled (port = 0)");
        None
    };

    let http = if config.http_enabled() {
        let listener = bind(config.listen_addr(config.http_listen_port)).await?;
        info!("HTTP server listening on {}", listener.local_addr()?);
        Some(listener)
    } else {
        info!("HTTP server disabled (port = 0)");
        None
    };

    Ok((tcp, http))
}

async fn bind(addr: String) -> Result<TcpListener, StartupError> {
    TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })
}

/// The gateway's listeners and shared context.
#[derive(Debug)]
pub struct GatewayServer {
    tcp: Option<TcpListener>,
    http: Option<TcpListener>,
    context: Arc<ServerContext>,
}

impl GatewayServer {
    /// Server over already-bound listeners.
    pub fn new(
        tcp: Option<TcpListener>,
        http: Option<TcpListener>,
        context: Arc<ServerContext>,
    ) -> Self {
        GatewayServer { tcp, http, context }
    }

    /// Address of the raw TCP listener.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the HTTP listener.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Accept connections until `running` is cleared, then wait for in-flight
    /// requests to finish.
    pub async fn run(self, running: Arc<AtomicBool>) {
        info!("FLEX gateway ready, waiting for connections");
        let mut clients = JoinSet::new();

        while running.load(Ordering::SeqCst) {
            tokio::select! {
                accepted = accept(self.tcp.as_ref()) => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Serial TCP client connected from {}", peer);
                        clients.spawn(serve(Frontend::Tcp, stream, Arc::clone(&self.context)));
                    }
                    Err(e) => warn!("Serial TCP accept failed: {}", e),
                },
                accepted = accept(self.http.as_ref()) => match accepted {
                    Ok((stream, peer)) => {
                        debug!("HTTP client connected from {}", peer);
                        clients.spawn(serve(Frontend::Http, stream, Arc::clone(&self.context)));
                    }
                    Err(e) => warn!("HTTP accept failed: {}", e),
                },
                Some(finished) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Client task failed: {}", e);
                    }
                }
                _ = tokio::time::sleep(SHUTDOWN_POLL) => {}
            }
        }

        if !clients.is_empty() {
            info!("Waiting for {} in-flight request(s)", clients.len());
        }
        while let Some(finished) = clients.join_next().await {
            if let Err(e) = finished {
                warn!("Client task failed: {}", e);
            }
        }
        info!("FLEX gateway stopped");
    }
}

async fn accept(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn serve(frontend: Frontend, stream: TcpStream, context: Arc<ServerContext>) {
    let active = metrics::gauge!(metric_defs::ACTIVE_CONNECTIONS.name);
    active.increment(1.0);

    let result = match frontend {
        Frontend::Tcp => tcp::serve_client(stream, context).await,
        Frontend::Http => http::serve_client(stream, context).await,
    };

    active.decrement(1.0);
    match result {
        Ok(()) => debug!("{} client connection closed", frontend.as_str()),
        Err(e) => debug!("{} client error: {}", frontend.as_str(), e),
    }
}
