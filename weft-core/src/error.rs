use serde::Serialize;

/// Error taxonomy used across the coordination engine.
///
/// Each variant maps to a fixed HTTP status at the adapter edge; the core
/// itself never encodes a status code.
#[derive(thiserror::Error, Debug, Clone, Serialize)]
pub enum WeftError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl WeftError {
    /// The status code a surface adapter (HTTP, WS) should report.
    pub fn status_code(&self) -> u16 {
        match self {
            WeftError::BadRequest(_) => 400,
            WeftError::Unauthorized => 401,
            WeftError::NotFound(_) => 404,
            WeftError::Conflict(_) => 409,
            WeftError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;
