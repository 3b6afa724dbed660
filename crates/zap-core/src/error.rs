//! Error types for the zapsync workspace

use thiserror::Error;

/// Main error type shared by the client crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication required")]
    Unauthenticated,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("QR code expired")]
    Expired,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("push channel error: {0}")]
    Channel(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl Error {
    /// Map a non-2xx response to an error kind.
    ///
    /// The backend puts a human-readable `message` field in its JSON error
    /// bodies; fall back to the raw body, then to the status text.
    /// Consumes the response, so call only after checking the status.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        match status.as_u16() {
            401 | 403 => Error::Unauthenticated,
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            _ => Error::Api(format!("{}: {}", status.as_u16(), message)),
        }
    }

    /// Whether the cached bearer token should be discarded after this error.
    pub fn invalidates_token(&self) -> bool {
        matches!(self, Error::Unauthenticated)
    }
}

fn extract_message(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return Some(message.to_string());
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
