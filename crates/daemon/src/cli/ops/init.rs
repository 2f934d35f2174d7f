use clap::Args;

use cidstore_daemon::state::{AppConfig, AppState, IdentityConfig};
use common::prelude::OwnerQueryPolicy;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long, default_value_t = 3003)]
    pub api_port: u16,

    /// Label of the default client identity
    #[arg(long, default_value = "appUser")]
    pub identity: String,

    /// Membership service provider of the default identity
    #[arg(long, default_value = "Org1MSP")]
    pub msp_id: String,

    /// Bearer token for the default identity; without one, requests
    ///  that carry no credentials act as the default identity
    #[arg(long)]
    pub default_token: Option<String>,

    /// Let callers query records of any owner, not just their own
    #[arg(long)]
    pub open_owner_queries: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] cidstore_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let owner_query_policy = if self.open_owner_queries {
            OwnerQueryPolicy::Open
        } else {
            OwnerQueryPolicy::CallerOnly
        };
        let config = AppConfig {
            api_port: self.api_port,
            default_identity: self.identity.clone(),
            identities: vec![IdentityConfig {
                label: self.identity.clone(),
                msp_id: self.msp_id.clone(),
                id: None,
                token: self.default_token.clone(),
            }],
            owner_query_policy,
            ..Default::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let owner_id = state.config.identities[0].to_identity().id;

        let output = format!(
            "Initialized cidstore directory at: {}\n\
             - Database: {}\n\
             - Config: {}\n\
             - API port: {}\n\
             - Default identity: {} ({})\n\
             - Credentials: {}\n\
             - Owner queries: {:?}",
            state.cidstore_dir.display(),
            state.db_path.display(),
            state.config_path.display(),
            state.config.api_port,
            state.config.default_identity,
            owner_id,
            if self.default_token.is_some() {
                "bearer token required"
            } else {
                "none required for the default identity"
            },
            state.config.owner_query_policy,
        );

        Ok(output)
    }
}
