use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::record::LedgerEntry;

use super::{Caller, RecordsError, Success};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct ListRequest {}

/// Records in fingerprint order; values that no longer decode
///  as records are listed as raw text
pub type ListResponse = Vec<LedgerEntry>;

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
) -> Result<Response, RecordsError> {
    let entries = state
        .gateway()
        .get_all_cids(&caller.label)
        .await
        .map_err(|e| caller.fail(e))?;

    tracing::debug!("LIST CIDS: {} entries for {}", entries.len(), caller.label);
    Ok(Json(Success::new(entries)).into_response())
}

impl ApiRequest for ListRequest {
    type Response = ListResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/records")?;
        Ok(client.get(full_url))
    }
}
