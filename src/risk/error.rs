//! Risk manager error types.

use crate::storage::StorageError;

/// Risk manager error type.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// A secondary heuristic could not be computed.
    #[error("analytics error: {0}")]
    Analytics(String),
    #[error("order {0} is already registered")]
    DuplicateOrder(String),
    #[error("audit log error: {0}")]
    Storage(#[from] StorageError),
}
