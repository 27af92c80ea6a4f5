//! Error types for the API client and the chat controller

use reqwest::StatusCode;
use thiserror::Error;

/// Low-level failure talking to the assistant API.
///
/// The variants only feed the diagnostic log; the user sees a [`ClientError`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout, broken body stream
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status
    #[error("server returned {status}{}", detail_suffix(.detail))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },

    /// The body could not be decoded into the expected shape
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// The two failures surfaced to the user.
///
/// `Display` is the exact message shown in the UI.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to send question. Make sure the backend is running.")]
    SendFailure(#[source] ApiError),

    #[error("Failed to load conversation history.")]
    HistoryFailure(#[source] ApiError),
}

impl ClientError {
    /// Underlying API failure, for logging
    pub fn api_error(&self) -> &ApiError {
        match self {
            ClientError::SendFailure(err) | ClientError::HistoryFailure(err) => err,
        }
    }
}
