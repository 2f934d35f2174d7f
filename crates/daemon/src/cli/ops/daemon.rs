use clap::Args;

use cidstore_daemon::state::AppState;
use cidstore_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (defaults to logs/ in the config directory)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Log to stdout only
    #[arg(long, conflicts_with = "log_dir")]
    pub no_log_file: bool,

    /// Include full error chains in API responses
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] cidstore_daemon::state::StateError),
    #[error("service error: {0}")]
    Service(#[from] cidstore_daemon::ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.cidstore)
        let state = AppState::load(ctx.config_path.clone())?;

        let mut config = ServiceConfig::from_app_state(&state, tracing::Level::DEBUG);
        if let Some(api_port) = self.api_port {
            config.api_port = api_port;
        }
        if self.no_log_file {
            config.log_dir = None;
        } else if let Some(log_dir) = &self.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        config.debug |= self.debug;

        spawn_service(&config).await?;
        Ok("daemon ended".to_string())
    }
}
