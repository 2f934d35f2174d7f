use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::gateway::GatewayError;
use common::record::CidRecord;

use super::{Caller, RecordsError, Success};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    /// Content fingerprint (CID) to record
    #[arg(long)]
    #[serde(alias = "fingerprint")]
    pub cid: String,
    /// Name of the file the content came from
    #[arg(long)]
    pub file_name: String,
}

pub type StoreResponse = CidRecord;

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    body: Result<Json<StoreRequest>, JsonRejection>,
) -> Result<Response, RecordsError> {
    let Json(req) = body.map_err(|e| caller.fail(GatewayError::Validation(e.body_text())))?;
    tracing::info!(
        "STORE CID: {} storing {} ({})",
        caller.label,
        req.cid,
        req.file_name
    );

    let record = state
        .gateway()
        .store_cid(&caller.label, &req.cid, &req.file_name)
        .await
        .map_err(|e| caller.fail(e))?;

    tracing::info!("STORE CID: {} recorded for {}", record.fingerprint, record.owner);
    Ok((http::StatusCode::CREATED, Json(Success::new(record))).into_response())
}

impl ApiRequest for StoreRequest {
    type Response = StoreResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/records")?;
        Ok(client.post(full_url).json(&self))
    }
}
