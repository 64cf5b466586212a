use std::error::Error as _;

use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::sources::connectivity::Connectivity;
use crate::sources::request::ApiRequest;

/// Connectivity-aware transport that sends [`ApiRequest`]s and decodes their
/// typed responses.
///
/// Cloning is cheap and every clone shares the same connection pool and
/// connectivity view. Calls are independent and may run concurrently.
#[derive(Clone, Debug)]
pub struct FetchClient {
    http: ClientWithMiddleware,
    base: Option<String>,
    connectivity: Connectivity,
    max_body_bytes: usize,
}

impl FetchClient {
    pub fn new(base: Option<String>, connectivity: Connectivity) -> Result<Self, HttpError> {
        Ok(Self::with_http(
            crate::sources::http_client()?,
            base,
            connectivity,
        ))
    }

    pub fn with_http(
        http: ClientWithMiddleware,
        base: Option<String>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            http,
            base,
            connectivity,
            max_body_bytes: crate::sources::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub async fn send<R: ApiRequest>(&self, request: &R) -> Result<R::Response, HttpError> {
        if !self.connectivity.is_online() {
            return Err(HttpError::NoConnection);
        }

        let req = request.build(self.base()).map_err(|err| {
            warn!(path = request.path(), error = %err, "Request could not be built");
            HttpError::InvalidUrl
        })?;

        let resp = self
            .http
            .execute(req)
            .await
            .map_err(HttpError::RequestFailed)?;

        let status = resp.status();
        if !is_success(status) {
            return Err(HttpError::BadStatusCode(status.as_u16()));
        }

        let bytes = crate::sources::read_limited_body(resp, self.max_body_bytes).await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            debug!(
                path = request.path(),
                error = %err,
                cause = ?err.source(),
                "Response did not decode"
            );
            HttpError::DecodingFailed(err)
        })
    }
}

/// 2xx codes that are registered statuses; unassigned codes such as 250 are
/// treated as a bad status.
fn is_success(status: StatusCode) -> bool {
    status.is_success() && status.canonical_reason().is_some()
}
