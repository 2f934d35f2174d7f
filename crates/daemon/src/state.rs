use std::collections::HashSet;
use std::{fs, path::PathBuf};

use common::prelude::{GatewayConfig, Identity, OrdererConfig, OwnerQueryPolicy};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "cidstore";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const LOGS_DIR_NAME: &str = "logs";

/// A client identity provisioned into the daemon's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Wallet label clients select with the identity header
    pub label: String,
    pub msp_id: String,
    /// Client id recorded as owner; derived from the label
    ///  and msp id when not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Bearer token a request presents to act as this identity.
    /// Only the default identity may go without one, in which case
    ///  requests without credentials act as it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl IdentityConfig {
    pub fn to_identity(&self) -> Identity {
        match &self.id {
            Some(id) => Identity::new(&self.label, &self.msp_id, id),
            None => Identity::x509(&self.label, &self.msp_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(default = "default_evaluate_timeout_ms")]
    pub evaluate_timeout_ms: u64,
    #[serde(default = "default_evaluate_attempts")]
    pub evaluate_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_submit_timeout_ms() -> u64 {
    30_000
}

fn default_evaluate_timeout_ms() -> u64 {
    5_000
}

fn default_evaluate_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            submit_timeout_ms: default_submit_timeout_ms(),
            evaluate_timeout_ms: default_evaluate_timeout_ms(),
            evaluate_attempts: default_evaluate_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl From<GatewaySettings> for GatewayConfig {
    fn from(settings: GatewaySettings) -> Self {
        use std::time::Duration;

        Self {
            submit_timeout: Duration::from_millis(settings.submit_timeout_ms),
            evaluate_timeout: Duration::from_millis(settings.evaluate_timeout_ms),
            evaluate_attempts: settings.evaluate_attempts,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdererSettings {
    #[serde(default = "default_max_message_count")]
    pub max_message_count: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_max_message_count() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    50
}

impl Default for OrdererSettings {
    fn default() -> Self {
        Self {
            max_message_count: default_max_message_count(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl From<OrdererSettings> for OrdererConfig {
    fn from(settings: OrdererSettings) -> Self {
        Self {
            max_message_count: settings.max_message_count,
            batch_timeout: std::time::Duration::from_millis(settings.batch_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Identity used when a request does not name one
    #[serde(default = "default_identity")]
    pub default_identity: String,
    #[serde(default = "default_identities")]
    pub identities: Vec<IdentityConfig>,
    #[serde(default)]
    pub owner_query_policy: OwnerQueryPolicy,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub orderer: OrdererSettings,
    /// Include full error chains in API responses
    #[serde(default)]
    pub debug: bool,
}

fn default_api_port() -> u16 {
    3003
}

fn default_identity() -> String {
    "appUser".to_string()
}

fn default_identities() -> Vec<IdentityConfig> {
    vec![IdentityConfig {
        label: default_identity(),
        msp_id: "Org1MSP".to_string(),
        id: None,
        token: None,
    }]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            default_identity: default_identity(),
            identities: default_identities(),
            owner_query_policy: OwnerQueryPolicy::default(),
            gateway: GatewaySettings::default(),
            orderer: OrdererSettings::default(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the cidstore directory (~/.cidstore)
    pub cidstore_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the cidstore directory path (custom or default ~/.cidstore)
    pub fn cidstore_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new cidstore directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let cidstore_dir = Self::cidstore_dir(custom_path)?;

        if cidstore_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&cidstore_dir)?;

        let config = config.unwrap_or_default();
        validate(&config)?;
        let config_path = cidstore_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        // Created empty, the service runs migrations on start
        let db_path = cidstore_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            cidstore_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the cidstore directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let cidstore_dir = Self::cidstore_dir(custom_path)?;

        if !cidstore_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = cidstore_dir.join(DB_FILE_NAME);
        let config_path = cidstore_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        validate(&config)?;

        Ok(Self {
            cidstore_dir,
            db_path,
            config_path,
            config,
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.cidstore_dir.join(LOGS_DIR_NAME)
    }
}

fn validate(config: &AppConfig) -> Result<(), StateError> {
    if !config
        .identities
        .iter()
        .any(|identity| identity.label == config.default_identity)
    {
        return Err(StateError::UnknownDefaultIdentity(
            config.default_identity.clone(),
        ));
    }

    let mut tokens = HashSet::new();
    for identity in &config.identities {
        match &identity.token {
            Some(token) if token.trim().is_empty() || !tokens.insert(token.as_str()) => {
                return Err(StateError::InvalidToken(identity.label.clone()));
            }
            Some(_) => {}
            None if identity.label != config.default_identity => {
                return Err(StateError::MissingToken(identity.label.clone()));
            }
            None => {}
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cidstore directory not initialized. Run 'cidstore init' first")]
    NotInitialized,

    #[error("cidstore directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("default identity {0} is not among the configured identities")]
    UnknownDefaultIdentity(String),

    #[error("identity {0} needs a token, only the default identity may go without")]
    MissingToken(String),

    #[error("token of identity {0} is empty or shared with another identity")]
    InvalidToken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
