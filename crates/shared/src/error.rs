use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body the backend attaches to non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDetail {
    pub detail: String,
}

#[derive(Debug, Error)]
#[error("backend returned {status}: {detail}")]
pub struct BackendStatusError {
    pub status: u16,
    pub detail: String,
}

impl BackendStatusError {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}
