use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::v0::records::{Failure, Success};

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    /// Bearer token to authenticate with; the daemon's default
    ///  identity acts for requests without one
    pub token: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            token: None,
            client,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let mut request_builder = request.build_request(&self.remote, &self.client)?;
        if let Some(token) = &self.token {
            request_builder = request_builder.bearer_auth(token);
        }
        let response = request_builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let envelope: Success<T::Response> = serde_json::from_str(&body)?;
            return Ok(envelope.result);
        }

        match serde_json::from_str::<Failure>(&body) {
            Ok(failure) => Err(ApiError::Ledger {
                status,
                kind: failure.kind,
                message: failure.error,
            }),
            Err(_) => Err(ApiError::HttpStatus(status, body)),
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
