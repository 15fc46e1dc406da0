use serde::Serialize;
use thiserror::Error;

/// Shown when the backend gives no usable error message.
pub const GENERIC_FAILURE: &str = "Analysis failed";

/// Shown when the selected file is not declared as an image.
pub const NOT_AN_IMAGE: &str = "Please upload an image file";

/// Failure of a single scan attempt. Neither kind is fatal: the session ends up
/// in a state where a new file can be selected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ScanError {
    /// Wrong file type, or a response body that does not match the wire contract.
    #[error("{0}")]
    Validation(String),
    /// Network failure or a non-success HTTP status.
    #[error("{0}")]
    Transport(String),
}

impl ScanError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScanError::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ScanError::Transport(msg.into())
    }

    /// The text written into the session's error message.
    pub fn user_message(&self) -> &str {
        match self {
            ScanError::Validation(m) | ScanError::Transport(m) => m,
        }
    }
}
