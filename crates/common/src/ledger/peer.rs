use std::sync::Arc;

use bytes::Bytes;

use super::Proposal;
use crate::contract::{CidStoreContract, ClientIdentity, ContractError, TxContext};
use crate::state::{ReadWriteSet, StateDatabase, TxStub};

/// Result of simulating a proposal
#[derive(Debug, Clone)]
pub struct ProposalResponse {
    pub tx_id: String,
    pub creator: ClientIdentity,
    pub payload: Bytes,
    pub rwset: ReadWriteSet,
}

/// Runs the contract against committed state without changing it.
#[derive(Debug)]
pub struct Endorser {
    db: Arc<dyn StateDatabase>,
    contract: CidStoreContract,
}

impl Endorser {
    pub fn new(db: Arc<dyn StateDatabase>, contract: CidStoreContract) -> Self {
        Self { db, contract }
    }

    pub async fn simulate(&self, proposal: &Proposal) -> Result<ProposalResponse, ContractError> {
        let mut ctx = TxContext::new(
            proposal.tx_id.clone(),
            proposal.timestamp,
            proposal.creator.clone(),
            TxStub::new(self.db.clone()),
        );
        let payload = self
            .contract
            .invoke(&mut ctx, proposal.operation, &proposal.args)
            .await?;

        tracing::debug!(
            tx_id = %proposal.tx_id,
            operation = %proposal.operation,
            reads = ctx.stub.read_write_set().reads.len(),
            writes = ctx.stub.read_write_set().writes.len(),
            "proposal simulated"
        );
        Ok(ProposalResponse {
            tx_id: ctx.tx_id,
            creator: ctx.identity,
            payload: Bytes::from(payload),
            rwset: ctx.stub.into_read_write_set(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Operation;
    use crate::key::encode_key;
    use crate::state::MemoryStateDatabase;

    #[tokio::test]
    async fn test_simulation_does_not_touch_state() {
        let db: Arc<dyn StateDatabase> = Arc::new(MemoryStateDatabase::new());
        let endorser = Endorser::new(db.clone(), CidStoreContract::default());
        let proposal = Proposal::new(
            ClientIdentity::new("Org1MSP", "user1"),
            Operation::StoreCid,
            vec!["Qm123".into(), "photo.png".into()],
        );

        let response = endorser.simulate(&proposal).await.unwrap();
        assert_eq!(response.tx_id, proposal.tx_id);
        assert!(response
            .rwset
            .writes
            .contains_key(&encode_key("user1", "Qm123")));
        assert!(db.get(&encode_key("user1", "Qm123")).await.unwrap().is_none());
    }
}
