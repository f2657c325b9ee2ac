//! Control plane error types.

use crate::emergency::EmergencyError;

/// Control plane error type.
#[derive(Debug, thiserror::Error)]
pub enum PlaneError {
    #[error("control plane is already running")]
    AlreadyRunning,
    #[error("emergency monitor error: {0}")]
    Emergency(#[from] EmergencyError),
}
