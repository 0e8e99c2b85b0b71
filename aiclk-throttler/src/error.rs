//! Error type shared by the library.

use std::path::PathBuf;

use thiserror::Error;

/// Status code reported to the control plane for a successful request.
pub const STATUS_OK: i32 = 0;

/// Status code reported to the control plane for a rejected request.
pub const STATUS_INVALID: i32 = -1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid payload length: expected {expected} bytes, got {actual}")]
    InvalidPayloadLength { expected: usize, actual: usize },

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl Error {
    /// Numeric status for the message-based control plane.
    pub fn status_code(&self) -> i32 {
        STATUS_INVALID
    }
}

/// Map a handler result onto the control plane's numeric status.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
