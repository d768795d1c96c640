use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// A failure reported by the remote cloud API, as the service error code plus
/// its message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Remote error codes the migration steps react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    AccountNotFound,
    ConcurrentModification,
    AccessDenied,
    OrganizationsNotInUse,
    NoSuchEntity,
    ConstraintViolation,
    HandshakeConstraintViolation,
    DuplicateAccount,
    Other,
}

impl ApiErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "AccountNotFoundException" => ApiErrorKind::AccountNotFound,
            "ConcurrentModificationException" => ApiErrorKind::ConcurrentModification,
            "AccessDenied" | "AccessDeniedException" => ApiErrorKind::AccessDenied,
            "AWSOrganizationsNotInUseException" => ApiErrorKind::OrganizationsNotInUse,
            "NoSuchEntity" => ApiErrorKind::NoSuchEntity,
            "ConstraintViolationException" => ApiErrorKind::ConstraintViolation,
            "HandshakeConstraintViolationException" => ApiErrorKind::HandshakeConstraintViolation,
            "DuplicateAccountException" => ApiErrorKind::DuplicateAccount,
            _ => ApiErrorKind::Other,
        }
    }

    /// Canonical remote code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorKind::AccountNotFound => "AccountNotFoundException",
            ApiErrorKind::ConcurrentModification => "ConcurrentModificationException",
            ApiErrorKind::AccessDenied => "AccessDenied",
            ApiErrorKind::OrganizationsNotInUse => "AWSOrganizationsNotInUseException",
            ApiErrorKind::NoSuchEntity => "NoSuchEntity",
            ApiErrorKind::ConstraintViolation => "ConstraintViolationException",
            ApiErrorKind::HandshakeConstraintViolation => "HandshakeConstraintViolationException",
            ApiErrorKind::DuplicateAccount => "DuplicateAccountException",
            ApiErrorKind::Other => "UnknownError",
        }
    }
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn of_kind(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.code(), message)
    }

    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_code(&self.code)
    }

    pub fn is(&self, kind: ApiErrorKind) -> bool {
        self.kind() == kind
    }
}
