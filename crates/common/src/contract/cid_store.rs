use futures::TryStreamExt;

use super::{ContractError, Operation, OwnerQueryPolicy, TxContext};
use crate::key::{encode_key, range_bounds};
use crate::record::{CidRecord, LedgerEntry, DOC_TYPE};
use crate::state::Selector;

fn require_non_empty(field: &str, value: &str) -> Result<(), ContractError> {
    if value.is_empty() {
        return Err(ContractError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Record the caller as owner of `fingerprint`, replacing
///  any record the caller already holds for it.
pub async fn store_cid(
    ctx: &mut TxContext,
    fingerprint: &str,
    file_name: &str,
) -> Result<CidRecord, ContractError> {
    require_non_empty("cid", fingerprint)?;
    require_non_empty("fileName", file_name)?;

    let record = CidRecord::new(fingerprint, ctx.caller(), file_name, ctx.timestamp);
    let key = encode_key(ctx.caller(), fingerprint);
    ctx.stub.put_state(key, record.to_vec()?);

    tracing::debug!(tx_id = %ctx.tx_id, cid = %fingerprint, "StoreCID: record staged");
    Ok(record)
}

/// The caller's record for `fingerprint`.
///
/// Unlike [`get_all_cids`], a stored value that no longer decodes as a
///  [`CidRecord`] is not handed back as raw text: the lookup fails with
///  [`ContractError::Serialization`], so point reads only ever return
///  typed records.
pub async fn get_cid(ctx: &mut TxContext, fingerprint: &str) -> Result<CidRecord, ContractError> {
    require_non_empty("cid", fingerprint)?;

    let key = encode_key(ctx.caller(), fingerprint);
    match ctx.stub.get_state(&key).await? {
        Some(bytes) if !bytes.is_empty() => CidRecord::from_slice(&bytes).map_err(|e| {
            tracing::warn!(%key, error = %e, "GetCID: stored value does not decode");
            ContractError::from(e)
        }),
        _ => Err(ContractError::NotFound(fingerprint.to_string())),
    }
}

/// Every record the caller owns, in fingerprint order.
///
/// Values that fail to decode are returned as raw text.
pub async fn get_all_cids(ctx: &TxContext) -> Result<Vec<LedgerEntry>, ContractError> {
    let mut cursor = ctx.stub.get_state_by_range(range_bounds(ctx.caller()));
    let mut entries = Vec::new();

    while let Some(entry) = cursor.try_next().await? {
        if entry.value.is_empty() {
            continue;
        }
        match CidRecord::from_slice(&entry.value) {
            Ok(record) => entries.push(LedgerEntry::Record(record)),
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "GetAllCIDs: returning undecodable value as raw text");
                entries.push(LedgerEntry::Raw(
                    String::from_utf8_lossy(&entry.value).into_owned(),
                ));
            }
        }
    }
    Ok(entries)
}

/// Records owned by `owner`, found by rich query.
///
/// Values that fail to decode are skipped.
pub async fn query_cids_by_owner(
    ctx: &TxContext,
    owner: &str,
    policy: OwnerQueryPolicy,
) -> Result<Vec<CidRecord>, ContractError> {
    require_non_empty("owner", owner)?;
    if policy == OwnerQueryPolicy::CallerOnly && owner != ctx.caller() {
        return Err(ContractError::Forbidden(owner.to_string()));
    }

    let selector = Selector::new()
        .where_eq("docType", DOC_TYPE)
        .where_eq("owner", owner);
    let mut cursor = ctx.stub.get_query_result(&selector.to_query_string())?;
    let mut records = Vec::new();

    while let Some(entry) = cursor.try_next().await? {
        if entry.value.is_empty() {
            continue;
        }
        match CidRecord::from_slice(&entry.value) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "QueryCIDsByOwner: skipping undecodable value");
            }
        }
    }
    Ok(records)
}

/// Nothing to seed; kept so deployments can run their usual init step
pub async fn init_ledger(ctx: &TxContext) -> Result<(), ContractError> {
    tracing::info!(tx_id = %ctx.tx_id, "InitLedger");
    Ok(())
}

/// The CID store contract as deployed on a peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CidStoreContract {
    policy: OwnerQueryPolicy,
}

impl CidStoreContract {
    pub fn new(policy: OwnerQueryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OwnerQueryPolicy {
        self.policy
    }

    /// Run `operation` with string arguments and return its JSON result.
    ///
    /// `InitLedger` returns an empty payload.
    pub async fn invoke(
        &self,
        ctx: &mut TxContext,
        operation: Operation,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        if args.len() != operation.arity() {
            return Err(ContractError::Arity {
                operation,
                expected: operation.arity(),
                actual: args.len(),
            });
        }

        let payload = match operation {
            Operation::InitLedger => {
                init_ledger(ctx).await?;
                Vec::new()
            }
            Operation::StoreCid => serde_json::to_vec(&store_cid(ctx, &args[0], &args[1]).await?)?,
            Operation::GetCid => serde_json::to_vec(&get_cid(ctx, &args[0]).await?)?,
            Operation::GetAllCids => serde_json::to_vec(&get_all_cids(ctx).await?)?,
            Operation::QueryCidsByOwner => {
                serde_json::to_vec(&query_cids_by_owner(ctx, &args[0], self.policy).await?)?
            }
        };
        Ok(payload)
    }
}
