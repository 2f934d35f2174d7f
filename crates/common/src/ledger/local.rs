use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use super::block::BlockStore;
use super::orderer::{self, Committer, Envelope, OrdererConfig};
use super::peer::Endorser;
use super::{Network, NetworkError, Proposal, TxValidationCode};
use crate::contract::CidStoreContract;
use crate::state::StateDatabase;

/// One peer plus one orderer, running inside the current process.
///
/// The orderer task keeps running for as long as any clone of the
///  network is alive.
#[derive(Debug, Clone)]
pub struct LocalNetwork {
    endorser: Arc<Endorser>,
    orderer: flume::Sender<Envelope>,
    blocks: Arc<BlockStore>,
    db: Arc<dyn StateDatabase>,
}

impl LocalNetwork {
    /// Start the orderer over `db`, resuming after its savepoint.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        db: Arc<dyn StateDatabase>,
        contract: CidStoreContract,
        config: OrdererConfig,
    ) -> Result<Self, NetworkError> {
        let next_block = db.savepoint().await?.map(|s| s + 1).unwrap_or(0);
        let blocks = Arc::new(BlockStore::starting_at(next_block));
        let (tx, rx) = flume::unbounded();

        let committer = Committer::new(db.clone(), blocks.clone());
        tokio::spawn(orderer::run(rx, committer, config));
        tracing::info!(next_block, policy = ?contract.policy(), "local ledger network started");

        Ok(Self {
            endorser: Arc::new(Endorser::new(db.clone(), contract)),
            orderer: tx,
            blocks,
            db,
        })
    }

    pub fn blocks(&self) -> &Arc<BlockStore> {
        &self.blocks
    }

    pub fn state(&self) -> &Arc<dyn StateDatabase> {
        &self.db
    }
}

#[async_trait]
impl Network for LocalNetwork {
    async fn evaluate(&self, proposal: Proposal) -> Result<Bytes, NetworkError> {
        let response = self.endorser.simulate(&proposal).await?;
        Ok(response.payload)
    }

    async fn submit(&self, proposal: Proposal) -> Result<Bytes, NetworkError> {
        let response = self.endorser.simulate(&proposal).await?;
        let tx_id = response.tx_id.clone();
        let payload = response.payload.clone();

        let (notify, committed) = oneshot::channel();
        self.orderer
            .send_async(Envelope { response, notify })
            .await
            .map_err(|_| NetworkError::Unavailable("orderer has stopped".into()))?;

        let code = committed
            .await
            .map_err(|_| NetworkError::Unavailable("orderer dropped the transaction".into()))??;
        match code {
            TxValidationCode::Valid => Ok(payload),
            code => Err(NetworkError::Invalidated { tx_id, code }),
        }
    }
}
