use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use common::prelude::{
    CidStoreContract, Gateway, LocalNetwork, MemoryWallet, NetworkError, SessionPool,
    StateDatabase, StateError,
};

use crate::database::{Database, DatabaseSetupError};
use crate::ServiceConfig;

/// Everything request handlers need, built once at start-up.
#[derive(Clone, Debug)]
pub struct State {
    database: Database,
    network: LocalNetwork,
    gateway: Gateway,
    tokens: Arc<BTreeMap<String, String>>,
    default_identity: String,
    debug: bool,
}

impl State {
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            None => Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url).await?;
        let fresh = database.savepoint().await?.is_none();

        // 2. Start the ledger over it
        let network = LocalNetwork::start(
            Arc::new(database.clone()),
            CidStoreContract::new(config.owner_query_policy),
            config.orderer,
        )
        .await?;

        // 3. Wallet and gateway
        if !config
            .identities
            .iter()
            .any(|identity| identity.label == config.default_identity)
        {
            return Err(StateSetupError::UnknownDefaultIdentity(
                config.default_identity.clone(),
            ));
        }
        for label in config.tokens.values() {
            if !config.identities.iter().any(|identity| &identity.label == label) {
                return Err(StateSetupError::UnknownTokenIdentity(label.clone()));
            }
        }
        let wallet = MemoryWallet::from_identities(config.identities.clone());
        let pool = SessionPool::new(Arc::new(wallet), Arc::new(network.clone()));
        let gateway = Gateway::new(pool, config.gateway);

        if fresh {
            tracing::info!("ServiceState::from_config - initializing new ledger");
            gateway
                .init_ledger(&config.default_identity)
                .await
                .map_err(|e| StateSetupError::InitLedger(e.to_string()))?;
        }

        Ok(Self {
            database,
            network,
            gateway,
            tokens: Arc::new(config.tokens.clone()),
            default_identity: config.default_identity.clone(),
            debug: config.debug,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn default_identity(&self) -> &str {
        &self.default_identity
    }

    /// Wallet label a request acts as, given the bearer token it
    ///  presented. `None` when the credential is unknown, or missing
    ///  while the default identity has a token.
    pub fn authenticate(&self, token: Option<&str>) -> Option<&str> {
        match token {
            Some(token) => self.tokens.get(token).map(String::as_str),
            None => {
                let default_has_token = self
                    .tokens
                    .values()
                    .any(|label| label == &self.default_identity);
                (!default_has_token).then_some(self.default_identity.as_str())
            }
        }
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("State database error: {0}")]
    StateDatabase(#[from] StateError),
    #[error("Ledger network error: {0}")]
    Network(#[from] NetworkError),
    #[error("default identity {0} is not in the wallet")]
    UnknownDefaultIdentity(String),
    #[error("token issued for {0}, which is not in the wallet")]
    UnknownTokenIdentity(String),
    #[error("failed to initialize ledger: {0}")]
    InitLedger(String),
}
