pub mod utils;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::http_server;
use crate::service_state::StateSetupError;
use crate::{ServiceConfig, ServiceState};

const LOG_FILE_NAME: &str = "cidstore.log";

/// How long the API server may take to drain once shutdown starts
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to set up service state: {0}")]
    Setup(#[from] StateSetupError),
    #[error("API server did not stop within {0:?}")]
    DrainTimeout(Duration),
    #[error("API server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running daemon: the ledger state and the API server in front of it.
///
/// The ledger's orderer runs for as long as any clone of the state is
///  alive; shutting down only stops the API server.
pub struct ServiceHandle {
    state: ServiceState,
    signals: JoinHandle<()>,
    api: JoinHandle<()>,
    shutdown_tx: watch::Sender<()>,
}

impl ServiceHandle {
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for a signal or [`shutdown`](Self::shutdown), then for the
    ///  API server to drain
    pub async fn wait(self) -> Result<(), ServiceError> {
        let _ = self.signals.await;
        match tokio::time::timeout(DRAIN_TIMEOUT, self.api).await {
            Ok(joined) => Ok(joined?),
            Err(_) => Err(ServiceError::DrainTimeout(DRAIN_TIMEOUT)),
        }
    }
}

fn env_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber: compact stdout, plus a daily rolling
///  file when a log directory is configured. Logs are flushed when the
///  returned guards drop.
fn init_logging(config: &ServiceConfig) -> Vec<WorkerGuard> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let mut guards = vec![stdout_guard];

    let stdout_layer = fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(env_filter(config.log_level));

    let file_layer = config.log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: cannot create log directory {}: {}",
                log_dir.display(),
                e
            );
            return None;
        }
        let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
        guards.push(file_guard);

        Some(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter(config.log_level)),
        )
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guards
}

/// Build the service state and start serving it over HTTP.
pub async fn start_service(config: &ServiceConfig) -> Result<ServiceHandle, ServiceError> {
    let state = ServiceState::from_config(config).await?;
    let (signals, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker();

    let listen_addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let api_config = http_server::Config::new(listen_addr);
    let api_state = state.clone();
    let api = tokio::spawn(async move {
        if let Err(e) = http_server::run_api(api_config, api_state, shutdown_rx).await {
            tracing::error!(error = %e, "API server stopped");
        }
    });

    tracing::info!(
        port = config.api_port,
        default_identity = state.default_identity(),
        "cidstore daemon running"
    );

    Ok(ServiceHandle {
        state,
        signals,
        api,
        shutdown_tx,
    })
}

/// Run the daemon until it is told to stop. Used by the `daemon` command.
pub async fn spawn_service(config: &ServiceConfig) -> Result<(), ServiceError> {
    let _guards = init_logging(config);
    utils::register_panic_logger();
    utils::report_build_info();

    let service = start_service(config).await.inspect_err(|e| {
        tracing::error!(error = %e, "failed to start the daemon");
    })?;
    service.wait().await
}
