//! Declarative request descriptors and their translation into concrete requests.

use std::collections::BTreeMap;

use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::error::RequestError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Describes one HTTP call and the shape of its successful response.
///
/// Implementors only provide data; `build` does the URL composition and never
/// performs I/O, so descriptors can be checked without a network.
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn path(&self) -> &str;

    fn method(&self) -> Method {
        Method::Get
    }

    /// Query parameters, appended in the order returned.
    fn query(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn body(&self) -> Option<Vec<u8>> {
        None
    }

    fn headers(&self) -> Option<BTreeMap<String, String>> {
        None
    }

    fn build(&self, base: Option<&str>) -> Result<reqwest::Request, RequestError> {
        let base = parse_base(base)?;
        let mut url = join_path(&base, self.path())?;

        let query = self.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(&query);
        }

        let mut request = reqwest::Request::new(self.method().into(), url);
        if let Some(body) = self.body() {
            *request.body_mut() = Some(body.into());
        }
        if let Some(headers) = self.headers() {
            // A header that cannot be encoded fails composition like any other part.
            for (name, value) in headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| RequestError::InvalidUrl)?;
                let value = HeaderValue::from_str(&value).map_err(|_| RequestError::InvalidUrl)?;
                request.headers_mut().insert(name, value);
            }
        }
        Ok(request)
    }
}

fn parse_base(base: Option<&str>) -> Result<Url, RequestError> {
    let raw = base
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RequestError::InvalidBaseUrl)?;
    let url = Url::parse(raw).map_err(|_| RequestError::InvalidBaseUrl)?;
    if url.cannot_be_a_base() || url.query().is_some() || url.fragment().is_some() {
        return Err(RequestError::InvalidBaseUrl);
    }
    Ok(url)
}

/// Appends `path` segment by segment below the base path. Each segment is
/// percent-encoded as needed and dot-segments never climb above the base.
fn join_path(base: &Url, path: &str) -> Result<Url, RequestError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RequestError::InvalidUrl)?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}
