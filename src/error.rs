use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend rejected the credential; the session has already been cleared.
    #[error("unauthorized: {}", .message.as_deref().unwrap_or("session expired"))]
    Unauthorized { message: Option<String> },

    #[error("backend returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: StatusCode,
        message: Option<String>,
        body: Option<Value>,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session storage error: {0}")]
    Session(#[source] anyhow::Error),

    #[error("invalid request path: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ApiError {
    pub(crate) fn from_status(status: StatusCode, body: Option<Value>) -> Self {
        let message = body.as_ref().and_then(backend_message);
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized { message };
        }
        ApiError::Status { status, message, body }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Text to show a user: the backend `message`, then `error`, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Unauthorized { message: Some(m) } => m.clone(),
            ApiError::Status { message: Some(m), .. } => m.clone(),
            ApiError::Invalid(m) => m.clone(),
            _ => fallback.to_string(),
        }
    }
}

fn backend_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
}
