//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// state-machine rules, ledger gates). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed or missing required field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (stale version, or the record is still referenced).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Base fields of a confirmed service can no longer change.
    #[error("service is locked: {0}")]
    ServiceLocked(String),

    /// Role or time-window check failed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("service is already confirmed")]
    AlreadyConfirmed,

    /// Payment or treatment against a service that is still only proposed.
    #[error("service {0} is not confirmed")]
    NotConfirmed(String),

    #[error("payment voucher must allocate to at least one service")]
    EmptyAllocation,

    /// Allocation exceeds the remaining debt of the target service.
    #[error("allocation of {requested} exceeds remaining debt {remaining} on service {service}")]
    OverAllocation {
        service: String,
        requested: Money,
        remaining: Money,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        Self::ServiceLocked(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Stable, machine-readable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::InvariantViolation(_) => ErrorKind::Internal,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::ServiceLocked(_) => ErrorKind::ServiceLocked,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::AlreadyConfirmed => ErrorKind::AlreadyConfirmed,
            DomainError::NotConfirmed(_) => ErrorKind::NotConfirmed,
            DomainError::EmptyAllocation => ErrorKind::EmptyAllocation,
            DomainError::OverAllocation { .. } => ErrorKind::OverAllocation,
        }
    }
}

/// Closed set of error kinds surfaced to callers.
///
/// The presentation layer renders messages from the kind, never from the
/// free-text detail, so the `code()` strings are part of the public contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    #[serde(rename = "validation_error")]
    Validation,
    ServiceLocked,
    Forbidden,
    AlreadyConfirmed,
    NotConfirmed,
    EmptyAllocation,
    OverAllocation,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation_error",
            ErrorKind::ServiceLocked => "service_locked",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::AlreadyConfirmed => "already_confirmed",
            ErrorKind::NotConfirmed => "not_confirmed",
            ErrorKind::EmptyAllocation => "empty_allocation",
            ErrorKind::OverAllocation => "over_allocation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}
