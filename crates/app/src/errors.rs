use serde::{Deserialize, Serialize};
use thiserror::Error;

use dentledger_core::{EmployeeId, ErrorKind};
use dentledger_infra::{ConfigError, LedgerError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The acting employee is not in the directory.
    #[error("unknown employee {0}")]
    UnknownEmployee(EmployeeId),

    #[error("read model unavailable: {0}")]
    ReadModel(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Ledger(e) => e.kind(),
            AppError::Config(_) | AppError::ReadModel(_) => ErrorKind::Internal,
            AppError::UnknownEmployee(_) => ErrorKind::NotFound,
        }
    }

    /// Stable snake_case code, e.g. `over_allocation`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Serializable error body: `{"error": "<code>", "message": "<detail>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: code.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status a transport layer would use for this body.
    pub fn status_code(kind: ErrorKind) -> u16 {
        match kind {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation | ErrorKind::EmptyAllocation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::ServiceLocked
            | ErrorKind::AlreadyConfirmed
            | ErrorKind::NotConfirmed
            | ErrorKind::OverAllocation
            | ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.error,
            "message": self.message,
        })
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        // Internal details stay in the logs.
        let message = match err.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => err.to_string(),
        };
        ErrorResponse::new(err.code(), message)
    }
}
