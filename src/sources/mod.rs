//! Transport layer: request descriptors, the typed fetch client, connectivity
//! observation and the universities catalog binding.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::error::HttpError;

pub mod client;
pub mod connectivity;
mod logging;
pub mod request;
pub mod universities;

pub use client::FetchClient;
pub use connectivity::{Connectivity, ConnectivityMonitor, Probe};
pub use request::{ApiRequest, Method};
pub use universities::{
    PAGE_SIZE, UniversitiesService, University, UniversitySearch, UniversitySearchRequest,
};

pub const BASE_URL_ENV: &str = "UNISEARCH_BASE_URL";
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Base endpoint from the environment, if one is set.
pub fn configured_base() -> Option<String> {
    std::env::var(BASE_URL_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Builds the HTTP stack used by [`FetchClient`].
///
/// No retry, cache or timeout layers: callers own retry policy and the
/// transport defaults apply.
pub(crate) fn http_client() -> Result<ClientWithMiddleware, HttpError> {
    let base_client = reqwest::Client::builder()
        .user_agent(concat!("unisearch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(HttpError::ClientInit)?;

    Ok(ClientBuilder::new(base_client)
        .with(logging::TraceMiddleware)
        .build())
}

/// Reads the full body, failing with `InvalidResponse` on a broken stream or
/// a body larger than `max_bytes`.
pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, HttpError> {
    let mut body: Vec<u8> = Vec::new();

    loop {
        let chunk = match resp.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "Response body could not be read");
                return Err(HttpError::InvalidResponse);
            }
        };
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > max_bytes {
            tracing::debug!(max_bytes, "Response body exceeded size limit");
            return Err(HttpError::InvalidResponse);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
