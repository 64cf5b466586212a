/// Failures while turning a request descriptor into a concrete HTTP request.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestError {
    #[error("Base URL is not configured")]
    InvalidBaseUrl,

    #[error("Failed to construct valid URL")]
    InvalidUrl,
}

/// Everything that can go wrong while sending a typed request.
///
/// `Display` is the fixed user-facing message for each kind; the underlying
/// cause, when there is one, is only reachable through `source()`.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("Invalid URL")]
    InvalidUrl,

    #[error("No internet connection available")]
    NoConnection,

    #[error("Network request failed. Please check your connection.")]
    RequestFailed(#[source] reqwest_middleware::Error),

    #[error("Invalid response from server")]
    InvalidResponse,

    #[error("Server error ({0})")]
    BadStatusCode(u16),

    #[error("Failed to process server response")]
    DecodingFailed(#[source] serde_json::Error),

    #[error("HTTP client initialization failed: {0}")]
    ClientInit(reqwest::Error),
}

impl HttpError {
    /// Stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::NoConnection => "no_connection",
            Self::RequestFailed(_) => "request_failed",
            Self::InvalidResponse => "invalid_response",
            Self::BadStatusCode(_) => "bad_status_code",
            Self::DecodingFailed(_) => "decoding_failed",
            Self::ClientInit(_) => "client_init",
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum UniSearchError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
