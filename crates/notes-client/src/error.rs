use serde_json::Value;
use thiserror::Error;

/// Message used when a failed response carries no usable text.
pub const FALLBACK_MESSAGE: &str = "Request failed";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The notes API answered with a non-2xx status
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The identity provider rejected a sign-in, sign-up or refresh
    #[error("{0}")]
    Auth(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pick the message to show for a failed response body.
///
/// Prefers the JSON `error` field, then `message`, then the raw text.
pub fn error_message(raw: &str) -> String {
    if raw.is_empty() {
        return FALLBACK_MESSAGE.to_string();
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        for field in ["error", "message"] {
            if let Some(message) = value.get(field).and_then(Value::as_str) {
                if !message.is_empty() {
                    return message.to_string();
                }
            }
        }
    }
    raw.to_string()
}
