use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::record::CidRecord;

use super::{Caller, RecordsError, Success};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct GetRequest {
    /// Content fingerprint (CID) to look up
    pub cid: String,
}

pub type GetResponse = CidRecord;

pub async fn handler(
    State(state): State<ServiceState>,
    caller: Caller,
    Path(cid): Path<String>,
) -> Result<Response, RecordsError> {
    tracing::debug!("GET CID: {} reading {}", caller.label, cid);

    let record = state
        .gateway()
        .get_cid(&caller.label, &cid)
        .await
        .map_err(|e| caller.fail(e))?;

    Ok(Json(Success::new(record)).into_response())
}

impl ApiRequest for GetRequest {
    type Response = GetResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let mut full_url = base_url.join("/api/v0/records/")?;
        full_url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(&self.cid);
        Ok(client.get(full_url))
    }
}
