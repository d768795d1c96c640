use thiserror::Error;

use crate::account::{AccountIdError, StatusError};
use crate::cloud::{ApiError, ApiErrorKind};
use crate::config::ConfigError;
use crate::store::StoreError;

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Failure that terminates a step so the scheduler can alert an operator.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid account id: {0}")]
    AccountId(#[from] AccountIdError),

    #[error("Account integrity error: {0}")]
    Integrity(String),

    #[error("Invalid step input: {0}")]
    InvalidInput(String),
}

impl MigrationError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            MigrationError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_api(&self, kind: ApiErrorKind) -> bool {
        self.api().is_some_and(|e| e.is(kind))
    }

    /// Duplicate masters and unexpected organization state.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            MigrationError::Integrity(_) | MigrationError::Store(StoreError::DuplicateMaster { .. })
        )
    }
}
