use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::record::CidRecord;

use super::{Caller, RecordsError, Success};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct QueryRequest {
    /// Owner id whose records to list
    #[arg(long)]
    pub owner: String,
}

pub type QueryResponse = Vec<CidRecord>;

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    Path(owner): Path<String>,
) -> Result<Response, RecordsError> {
    tracing::debug!("QUERY CIDS: {} querying owner {}", caller.label, owner);

    let records = state
        .gateway()
        .query_cids_by_owner(&caller.label, &owner)
        .await
        .map_err(|e| caller.fail(e))?;

    Ok(Json(Success::new(records)).into_response())
}

impl ApiRequest for QueryRequest {
    type Response = QueryResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let mut full_url = base_url.join("/api/v0/owners/")?;
        full_url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(&self.owner)
            .push("records");
        Ok(client.get(full_url))
    }
}
