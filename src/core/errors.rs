use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request failed ({status}): {detail}")]
    Http { status: u16, detail: String },
    #[error("authentication required")]
    Authentication,
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("session storage error: {0}")]
    Storage(String),
    #[error("unknown query mode: {0}")]
    UnknownMode(String),
}

impl ClientError {
    pub fn network<E: std::fmt::Display>(err: E) -> Self {
        ClientError::Network(err.to_string())
    }

    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        ClientError::Decode(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        ClientError::Storage(err.to_string())
    }

    /// Builds an `Http` error from a non-success status and its raw body,
    /// preferring the server's `detail` field when the body carries one.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ClientError::Http {
            status: status.as_u16(),
            detail: extract_detail(status, body),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication)
    }

    /// Text for the conversation error banner.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Network(msg) => {
                format!("Could not reach the server: {}. Please try again.", msg)
            }
            ClientError::Http { status, detail } => {
                format!("Request failed ({}): {}", status, detail)
            }
            ClientError::Authentication => "Your session has expired. Please log in again.".into(),
            ClientError::Decode(msg) => format!("Unexpected response from the server: {}", msg),
            other => other.to_string(),
        }
    }
}

fn extract_detail(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(payload) = serde_json::from_str::<Value>(trimmed) {
        match payload.get("detail").or_else(|| payload.get("error")) {
            Some(Value::String(detail)) if !detail.is_empty() => return detail.clone(),
            Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
    }

    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string()
}
