//! CID ownership records.
//!
//! Every response is an envelope: `{"success": true, "result": ...}` on
//! success, `{"success": false, "error": ..., "kind": ...}` on failure.
//! The caller acts as the wallet identity its bearer token was issued
//! for. Requests without credentials act as the configured default
//! identity, provided that identity has no token of its own.

use std::error::Error as _;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use common::gateway::GatewayError;

use crate::ServiceState;

pub mod get;
pub mod list;
pub mod query;
pub mod store;

pub use get::GetRequest;
pub use list::ListRequest;
pub use query::QueryRequest;
pub use store::StoreRequest;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/records", get(list::handler).post(store::handler))
        .route("/records/:cid", get(get::handler))
        .route("/owners/:owner/records", get(query::handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success<T> {
    pub success: bool,
    pub result: T,
}

impl<T> Success<T> {
    pub fn new(result: T) -> Self {
        Self {
            success: true,
            result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
    pub kind: String,
    /// Full error chain, only in debug mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Wallet label the request acts as
#[derive(Debug, Clone)]
pub struct Caller {
    pub label: String,
    debug: bool,
}

impl Caller {
    /// Wrap a failure, keeping internals out of the response unless debugging
    pub fn fail(&self, error: impl Into<GatewayError>) -> RecordsError {
        RecordsError {
            error: error.into(),
            debug: self.debug,
        }
    }
}

/// Token of an `Authorization: Bearer` header, if one was sent
fn bearer_token(parts: &Parts) -> Result<Option<&str>, GatewayError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or_else(|| GatewayError::Authentication("malformed authorization header".into()))
}

#[async_trait]
impl FromRequestParts<ServiceState> for Caller {
    type Rejection = RecordsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let debug = state.debug();
        let token = bearer_token(parts).map_err(|error| RecordsError { error, debug })?;
        let label = state.authenticate(token).ok_or_else(|| {
            let reason = if token.is_some() {
                "unknown credential"
            } else {
                "credential required"
            };
            RecordsError {
                error: GatewayError::Authentication(reason.to_string()),
                debug,
            }
        })?;
        Ok(Caller {
            label: label.to_string(),
            debug,
        })
    }
}

/// A gateway failure rendered as an error envelope.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RecordsError {
    error: GatewayError,
    debug: bool,
}

impl RecordsError {
    pub fn status(&self) -> StatusCode {
        match &self.error {
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Conflict { .. } => StatusCode::CONFLICT,
            GatewayError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Ledger(_) | GatewayError::Payload(_) | GatewayError::Wallet(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> String {
        let mut detail = format!("{:?}", self.error);
        let mut source = self.error.source();
        while let Some(e) = source {
            detail.push_str(&format!(": {}", e));
            source = e.source();
        }
        detail
    }
}

impl IntoResponse for RecordsError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.error.kind(), "RECORDS ERROR: {:?}", self.error);
        } else {
            tracing::warn!(kind = self.error.kind(), "RECORDS ERROR: {}", self.error);
        }

        // internal errors only describe themselves in debug mode
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR && !self.debug {
            "internal ledger error".to_string()
        } else {
            self.error.to_string()
        };
        let body = Failure {
            success: false,
            error,
            kind: self.error.kind().to_string(),
            detail: self.debug.then(|| self.detail()),
        };
        (status, Json(body)).into_response()
    }
}
