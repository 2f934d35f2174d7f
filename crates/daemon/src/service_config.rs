use std::collections::BTreeMap;
use std::path::PathBuf;

use common::prelude::{GatewayConfig, Identity, OrdererConfig, OwnerQueryPolicy};

use crate::state::AppState;

/// Resolved runtime configuration of the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// Port for the API HTTP server
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // ledger configuration
    /// Identities loaded into the wallet
    pub identities: Vec<Identity>,
    /// Bearer tokens, each mapped to the wallet label it acts as
    pub tokens: BTreeMap<String, String>,
    /// Wallet label used by requests without credentials, unless
    ///  that label has a token of its own
    pub default_identity: String,
    pub owner_query_policy: OwnerQueryPolicy,
    pub gateway: GatewayConfig,
    pub orderer: OrdererConfig,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
    /// Expose full error chains in API responses
    pub debug: bool,
}

impl Config {
    pub fn from_app_state(state: &AppState, log_level: tracing::Level) -> Self {
        let config = &state.config;
        Self {
            api_port: config.api_port,
            sqlite_path: Some(state.db_path.clone()),
            identities: config
                .identities
                .iter()
                .map(|identity| identity.to_identity())
                .collect(),
            tokens: config
                .identities
                .iter()
                .filter_map(|identity| {
                    let token = identity.token.clone()?;
                    Some((token, identity.label.clone()))
                })
                .collect(),
            default_identity: config.default_identity.clone(),
            owner_query_policy: config.owner_query_policy,
            gateway: config.gateway.into(),
            orderer: config.orderer.into(),
            log_level,
            log_dir: Some(state.logs_dir()),
            debug: config.debug,
        }
    }
}

impl Default for Config {
    /// In-memory service with a single `appUser` identity
    fn default() -> Self {
        Self {
            api_port: 3003,
            sqlite_path: None,
            identities: vec![Identity::x509("appUser", "Org1MSP")],
            tokens: BTreeMap::new(),
            default_identity: "appUser".to_string(),
            owner_query_policy: OwnerQueryPolicy::default(),
            gateway: GatewayConfig::default(),
            orderer: OrdererConfig::default(),
            log_level: tracing::Level::INFO,
            log_dir: None,
            debug: false,
        }
    }
}
