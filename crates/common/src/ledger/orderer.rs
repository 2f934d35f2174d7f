use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::block::{Block, BlockStore, Transaction};
use super::peer::ProposalResponse;
use super::{NetworkError, TxValidationCode};
use crate::key::StateKey;
use crate::state::{Height, StateDatabase, UpdateBatch};

/// Block cutting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdererConfig {
    /// Most transactions in one block
    pub max_message_count: usize,
    /// How long the first transaction of a block waits for company
    pub batch_timeout: Duration,
}

impl Default for OrdererConfig {
    fn default() -> Self {
        Self {
            max_message_count: 10,
            batch_timeout: Duration::from_millis(50),
        }
    }
}

pub(crate) type CommitResult = Result<TxValidationCode, NetworkError>;

/// An endorsed transaction waiting to be ordered
#[derive(Debug)]
pub(crate) struct Envelope {
    pub response: ProposalResponse,
    pub notify: oneshot::Sender<CommitResult>,
}

/// Validates ordered transactions and commits them to state.
#[derive(Debug, Clone)]
pub struct Committer {
    db: Arc<dyn StateDatabase>,
    blocks: Arc<BlockStore>,
}

impl Committer {
    pub fn new(db: Arc<dyn StateDatabase>, blocks: Arc<BlockStore>) -> Self {
        Self { db, blocks }
    }

    /// Validate `responses` in order, cut them into the next block and
    ///  apply the writes of the valid ones. Returns one code per response.
    pub async fn commit_batch(
        &self,
        responses: Vec<ProposalResponse>,
    ) -> Result<Vec<TxValidationCode>, NetworkError> {
        let block_num = self.blocks.height();
        let mut updates = UpdateBatch::new(block_num);
        // keys written by earlier valid transactions of this block
        let mut pending: HashMap<StateKey, Height> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut transactions = Vec::with_capacity(responses.len());

        for (tx_num, response) in responses.into_iter().enumerate() {
            let height = Height::new(block_num, tx_num as u64);
            let code = if self.blocks.tx_location(&response.tx_id).is_some()
                || !seen.insert(response.tx_id.clone())
            {
                TxValidationCode::DuplicateTxid
            } else {
                self.validate_reads(&response, &pending).await?
            };

            if code.is_valid() {
                for (key, value) in &response.rwset.writes {
                    updates.put(key.clone(), value.clone(), height);
                    pending.insert(key.clone(), height);
                }
            } else {
                tracing::warn!(tx_id = %response.tx_id, %code, "transaction invalidated");
            }
            transactions.push(Transaction {
                tx_id: response.tx_id,
                creator: response.creator,
                writes: response.rwset.writes,
                validation: code,
            });
        }

        let codes: Vec<TxValidationCode> = transactions.iter().map(|tx| tx.validation).collect();
        let block = Block::new(block_num, self.blocks.last_hash(), transactions);
        let valid = block.valid_count();
        let total = block.transactions.len();
        let keys = updates.len();

        self.db.apply_updates(updates).await?;
        self.blocks.append(block)?;

        tracing::info!(block = block_num, total, valid, keys, "block committed");
        Ok(codes)
    }

    async fn validate_reads(
        &self,
        response: &ProposalResponse,
        pending: &HashMap<StateKey, Height>,
    ) -> Result<TxValidationCode, NetworkError> {
        for (key, observed) in &response.rwset.reads {
            let current = match pending.get(key) {
                Some(height) => Some(*height),
                None => self.db.get(key).await?.map(|v| v.version),
            };
            if current != *observed {
                tracing::debug!(%key, ?observed, ?current, "stale read");
                return Ok(TxValidationCode::MvccReadConflict);
            }
        }
        Ok(TxValidationCode::Valid)
    }

    async fn commit_and_notify(&self, batch: Vec<Envelope>) {
        let (responses, notifiers): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|envelope| (envelope.response, envelope.notify))
            .unzip();

        match self.commit_batch(responses).await {
            Ok(codes) => {
                for (notify, code) in notifiers.into_iter().zip(codes) {
                    // the submitter may have given up waiting
                    let _ = notify.send(Ok(code));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to commit block");
                let reason = e.to_string();
                for notify in notifiers {
                    let _ = notify.send(Err(NetworkError::Unavailable(format!(
                        "commit failed: {}",
                        reason
                    ))));
                }
            }
        }
    }
}

/// Order envelopes into blocks until every sender is gone
pub(crate) async fn run(rx: flume::Receiver<Envelope>, committer: Committer, config: OrdererConfig) {
    let max = config.max_message_count.max(1);
    tracing::info!(
        max_message_count = max,
        batch_timeout_ms = config.batch_timeout.as_millis() as u64,
        "orderer started"
    );

    while let Ok(first) = rx.recv_async().await {
        let mut batch = vec![first];
        let deadline = tokio::time::Instant::now() + config.batch_timeout;
        while batch.len() < max {
            tokio::select! {
                received = rx.recv_async() => match received {
                    Ok(envelope) => batch.push(envelope),
                    Err(_) => break,
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        committer.commit_and_notify(batch).await;
    }

    tracing::info!("orderer stopped");
}
