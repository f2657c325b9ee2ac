//! Emergency stop error types.

use crate::exchanges::ExchangeError;

/// Emergency stop error type.
#[derive(Debug, thiserror::Error)]
pub enum EmergencyError {
    #[error("balance unavailable: {0}")]
    Balance(#[from] ExchangeError),
    #[error("monitor task failed: {0}")]
    Monitor(String),
}
