use axum::extract::State;
use axum::Json;
use serde::Serialize;

use common::version::{build_info, BuildInfo};

use crate::ServiceState;

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    #[serde(flatten)]
    pub build: BuildInfo,
    /// Number of the next block the ledger will commit
    pub ledger_height: u64,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        build: build_info(),
        ledger_height: state.network().blocks().height(),
    })
}
