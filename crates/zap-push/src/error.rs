//! Error types for zap-push

use thiserror::Error;

/// Push channel error type
#[derive(Error, Debug)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PushError>;
