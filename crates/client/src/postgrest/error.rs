//! PostgREST client error types.

use std::sync::Arc;

use boothmark_core::RemoteError;
use serde::Deserialize;

/// Errors from the PostgREST client.
#[derive(Debug, thiserror::Error)]
pub enum PostgrestError {
    #[error("missing API URL: BOOTHMARK_API_URL not set")]
    MissingApiUrl,

    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// 401/403 from the store, usually an expired or missing token.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Any other non-2xx response.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("request timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response body did not match the expected rows.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PostgrestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { PostgrestError::Timeout } else { PostgrestError::Network(Arc::new(err)) }
    }
}

impl From<PostgrestError> for RemoteError {
    fn from(err: PostgrestError) -> Self {
        match err {
            PostgrestError::Auth { status, message } | PostgrestError::Api { status, message } => {
                RemoteError::Rejected { status: Some(status), message }
            }
            PostgrestError::Timeout | PostgrestError::Network(_) => RemoteError::Network(err.to_string()),
            PostgrestError::Parse(msg) => RemoteError::Decode(msg),
            PostgrestError::MissingApiUrl | PostgrestError::InvalidUrl(_) => RemoteError::Unavailable(err.to_string()),
        }
    }
}

/// Error body PostgREST returns with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
    /// Auth endpoints use `msg` or `error_description` instead of `message`.
    #[serde(default, alias = "error_description")]
    msg: Option<String>,
}

/// Build the error for a non-2xx response.
pub(crate) fn from_response(status: u16, body: &[u8]) -> PostgrestError {
    let parsed: ApiErrorBody = serde_json::from_slice(body).unwrap_or_default();
    tracing::debug!(
        status,
        code = parsed.code.as_deref(),
        details = parsed.details.as_deref(),
        hint = parsed.hint.as_deref(),
        "store rejected request"
    );

    let message = parsed
        .message
        .or(parsed.msg)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP error: {status}"));

    if status == 401 || status == 403 {
        PostgrestError::Auth { status, message }
    } else {
        PostgrestError::Api { status, message }
    }
}
