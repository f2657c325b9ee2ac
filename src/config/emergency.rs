//! Emergency stop configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{duration, non_negative, non_zero};

/// Emergency stop monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Interval between condition evaluations (default: 30s).
    #[serde(with = "duration")]
    pub check_interval: Duration,
    /// Pause after a failed evaluation (default: 5s).
    #[serde(with = "duration")]
    pub error_backoff: Duration,
    /// How long `stop_monitoring` waits for the monitor task (default: 5s).
    #[serde(with = "duration")]
    pub join_timeout: Duration,
    /// Capital loss fraction that halts trading (default: 0.08).
    pub critical_loss_threshold: f64,
    /// Margin utilization that would halt trading (default: 0.95).
    pub margin_call_threshold: f64,
    /// Consecutive losing trades that halt trading (default: 7).
    pub consecutive_losses_limit: u32,
    /// Consecutive API errors that halt trading (default: 10).
    pub api_error_limit: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
            critical_loss_threshold: 0.08,
            margin_call_threshold: 0.95,
            consecutive_losses_limit: 7,
            api_error_limit: 10,
        }
    }
}

impl EmergencyConfig {
    /// Replaces zero durations and negative thresholds with the built-in defaults.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            check_interval: non_zero(self.check_interval, d.check_interval, "emergency", "check_interval"),
            error_backoff: non_zero(self.error_backoff, d.error_backoff, "emergency", "error_backoff"),
            join_timeout: non_zero(self.join_timeout, d.join_timeout, "emergency", "join_timeout"),
            critical_loss_threshold: non_negative(
                self.critical_loss_threshold,
                d.critical_loss_threshold,
                "emergency",
                "critical_loss_threshold",
            ),
            margin_call_threshold: non_negative(
                self.margin_call_threshold,
                d.margin_call_threshold,
                "emergency",
                "margin_call_threshold",
            ),
            consecutive_losses_limit: self.consecutive_losses_limit,
            api_error_limit: self.api_error_limit,
        }
    }
}
