//! # Transaction routing
//!
//! The gateway is what clients call. It resolves the caller's identity to
//! a pooled session, builds the proposal there and routes each operation by its
//! [`InvocationKind`](crate::contract::InvocationKind):
//!
//! - **submit** operations are endorsed, ordered and committed. The call
//!   resolves only once the transaction is committed valid, under
//!   [`GatewayConfig::submit_timeout`], and is never retried: a retry could
//!   apply the same change twice.
//! - **evaluate** operations run against committed state on a peer and
//!   are never ordered. Each attempt runs under
//!   [`GatewayConfig::evaluate_timeout`]; connection failures are retried up
//!   to [`GatewayConfig::evaluate_attempts`] times.
//!
//! Timeouts are reported as [`GatewayError::Timeout`] and not retried. For a
//! submit this means the outcome is unknown: the transaction may still
//! commit.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::contract::{ContractError, InvocationKind, Operation};
use crate::ledger::{Network, NetworkError, Proposal, TxValidationCode};
use crate::record::{CidRecord, LedgerEntry};

mod session;
mod wallet;

pub use session::{Session, SessionLease, SessionPool};
pub use wallet::{Identity, MemoryWallet, Wallet, WalletError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    pub submit_timeout: Duration,
    pub evaluate_timeout: Duration,
    pub evaluate_attempts: u32,
    /// Wait before the first evaluate retry, growing linearly
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            evaluate_timeout: Duration::from_secs(5),
            evaluate_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("no identity for {0} in the wallet")]
    Authentication(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("transaction {tx_id} failed validation: {code}")]
    Conflict {
        tx_id: String,
        code: TxValidationCode,
    },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl GatewayError {
    /// Short name of the error kind, stable for clients
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Authentication(_) => "AuthenticationError",
            GatewayError::NotFound(_) => "NotFound",
            GatewayError::Validation(_) => "ValidationError",
            GatewayError::Forbidden(_) => "Forbidden",
            GatewayError::Conflict { .. } => "ConflictError",
            GatewayError::Connection(_) => "ConnectionError",
            GatewayError::Timeout(_) => "Timeout",
            GatewayError::Ledger(_) => "LedgerError",
            GatewayError::Payload(_) => "PayloadError",
            GatewayError::Wallet(_) => "WalletError",
        }
    }

    /// Only connection failures of evaluate calls are worth another try
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Connection(_))
    }
}

impl From<NetworkError> for GatewayError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Contract(e) => match e {
                ContractError::NotFound(_) => GatewayError::NotFound(e.to_string()),
                ContractError::Validation(_)
                | ContractError::Arity { .. }
                | ContractError::UnknownOperation(_) => GatewayError::Validation(e.to_string()),
                ContractError::Forbidden(_) => GatewayError::Forbidden(e.to_string()),
                ContractError::Serialization(_) | ContractError::State(_) => {
                    GatewayError::Ledger(e.to_string())
                }
            },
            NetworkError::Invalidated { tx_id, code } => GatewayError::Conflict { tx_id, code },
            NetworkError::Unavailable(reason) => GatewayError::Connection(reason),
            NetworkError::State(e) => GatewayError::Ledger(e.to_string()),
        }
    }
}

/// Client entry point to the ledger.
#[derive(Debug, Clone)]
pub struct Gateway {
    pool: SessionPool,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(pool: SessionPool, config: GatewayConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run `operation` as the identity `label` and return its raw result
    pub async fn invoke(
        &self,
        label: &str,
        operation: Operation,
        args: Vec<String>,
    ) -> Result<Bytes, GatewayError> {
        let result = match operation.kind() {
            InvocationKind::Submit => self.submit(label, operation, args).await,
            InvocationKind::Evaluate => self.evaluate(label, operation, args).await,
        };

        if let Err(e) = &result {
            tracing::debug!(label, %operation, kind = e.kind(), error = %e, "invocation failed");
        }
        result
    }

    /// Build a proposal on the session of `label`.
    ///
    /// The lease is released before the proposal goes out, so calls made
    ///  under one identity only wait for each other while proposing.
    async fn propose(
        &self,
        label: &str,
        operation: Operation,
        args: Vec<String>,
    ) -> Result<(Proposal, Arc<dyn Network>), GatewayError> {
        let mut session = self.pool.lease(label).await?;
        let proposal = session.proposal(operation, args);
        let network = session.network();
        session.close();
        Ok((proposal, network))
    }

    async fn submit(
        &self,
        label: &str,
        operation: Operation,
        args: Vec<String>,
    ) -> Result<Bytes, GatewayError> {
        let timeout = self.config.submit_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        let (proposal, network) =
            match tokio::time::timeout_at(deadline, self.propose(label, operation, args)).await {
                Ok(proposed) => proposed?,
                Err(_) => return Err(GatewayError::Timeout(timeout)),
            };
        let tx_id = proposal.tx_id.clone();
        tracing::info!(%tx_id, %operation, "submitting transaction");

        match tokio::time::timeout_at(deadline, network.submit(proposal)).await {
            Ok(result) => {
                let payload = result?;
                tracing::info!(%tx_id, %operation, "transaction committed");
                Ok(payload)
            }
            Err(_) => {
                tracing::warn!(%tx_id, %operation, "submit timed out, outcome unknown");
                Err(GatewayError::Timeout(timeout))
            }
        }
    }

    async fn evaluate_once(
        &self,
        label: &str,
        operation: Operation,
        args: Vec<String>,
    ) -> Result<Bytes, GatewayError> {
        let (proposal, network) = self.propose(label, operation, args).await?;
        Ok(network.evaluate(proposal).await?)
    }

    async fn evaluate(
        &self,
        label: &str,
        operation: Operation,
        args: Vec<String>,
    ) -> Result<Bytes, GatewayError> {
        let attempts = self.config.evaluate_attempts.max(1);
        let timeout = self.config.evaluate_timeout;
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(
                timeout,
                self.evaluate_once(label, operation, args.clone()),
            )
            .await
            .unwrap_or(Err(GatewayError::Timeout(timeout)));

            match result {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(%operation, attempt, error = %e, "evaluate failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn init_ledger(&self, label: &str) -> Result<(), GatewayError> {
        self.invoke(label, Operation::InitLedger, vec![]).await?;
        Ok(())
    }

    pub async fn store_cid(
        &self,
        label: &str,
        fingerprint: &str,
        file_name: &str,
    ) -> Result<CidRecord, GatewayError> {
        let payload = self
            .invoke(
                label,
                Operation::StoreCid,
                vec![fingerprint.to_string(), file_name.to_string()],
            )
            .await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub async fn get_cid(&self, label: &str, fingerprint: &str) -> Result<CidRecord, GatewayError> {
        let payload = self
            .invoke(label, Operation::GetCid, vec![fingerprint.to_string()])
            .await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub async fn get_all_cids(&self, label: &str) -> Result<Vec<LedgerEntry>, GatewayError> {
        let payload = self.invoke(label, Operation::GetAllCids, vec![]).await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    pub async fn query_cids_by_owner(
        &self,
        label: &str,
        owner: &str,
    ) -> Result<Vec<CidRecord>, GatewayError> {
        let payload = self
            .invoke(label, Operation::QueryCidsByOwner, vec![owner.to_string()])
            .await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}
