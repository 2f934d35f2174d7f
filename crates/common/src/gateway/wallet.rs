use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::contract::ClientIdentity;

/// A client credential held in a wallet under a label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub label: String,
    pub msp_id: String,
    /// Network-wide client id; becomes the owner of stored records
    pub id: String,
}

impl Identity {
    pub fn new(label: impl Into<String>, msp_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            msp_id: msp_id.into(),
            id: id.into(),
        }
    }

    /// Identity with an x509-style client id derived from the label
    ///  and the issuing organization, e.g.
    ///  `x509::CN=appUser,OU=client::CN=ca.org1`
    pub fn x509(label: impl Into<String>, msp_id: impl Into<String>) -> Self {
        let label = label.into();
        let msp_id = msp_id.into();
        let lowered = msp_id.to_lowercase();
        let org = lowered.strip_suffix("msp").unwrap_or(&lowered);
        let id = format!("x509::CN={},OU=client::CN=ca.{}", label, org);
        Self { label, msp_id, id }
    }

    pub fn client_identity(&self) -> ClientIdentity {
        ClientIdentity::new(self.msp_id.clone(), self.id.clone())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WalletError {
    #[error("invalid identity: {0}")]
    Invalid(String),
    #[error("wallet error: {0}")]
    Provider(String),
}

/// Store of client identities keyed by label.
#[async_trait]
pub trait Wallet: Send + Sync + std::fmt::Debug + 'static {
    async fn get(&self, label: &str) -> Result<Option<Identity>, WalletError>;

    /// Add or replace the identity under its label
    async fn put(&self, identity: Identity) -> Result<(), WalletError>;

    async fn list(&self) -> Result<Vec<String>, WalletError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWallet {
    identities: Arc<RwLock<BTreeMap<String, Identity>>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let identities = identities
            .into_iter()
            .map(|identity| (identity.label.clone(), identity))
            .collect();
        Self {
            identities: Arc::new(RwLock::new(identities)),
        }
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn get(&self, label: &str) -> Result<Option<Identity>, WalletError> {
        Ok(self.identities.read().get(label).cloned())
    }

    async fn put(&self, identity: Identity) -> Result<(), WalletError> {
        if identity.label.is_empty() || identity.id.is_empty() {
            return Err(WalletError::Invalid(
                "label and id must not be empty".to_string(),
            ));
        }
        self.identities
            .write()
            .insert(identity.label.clone(), identity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, WalletError> {
        Ok(self.identities.read().keys().cloned().collect())
    }
}
