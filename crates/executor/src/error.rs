use core_types::{AccountId, CoreError};
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Malformed input, rejected before any transaction starts.
    #[error("Invalid order: {0}")]
    Validation(#[from] CoreError),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Storage fault. Any open transaction has been rolled back.
    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    /// Referential or arithmetic invariant broken. The transaction has been
    /// rolled back and the order left as it was.
    #[error("Integrity violation: {0}")]
    Integrity(String),
}
