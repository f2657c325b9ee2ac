//! Position tracker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{duration, non_negative, non_zero};

/// Position tracker storage and classification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Directory holding the tracked-position snapshot, history and trade journal.
    pub data_dir: String,
    /// Trade journal file name inside `data_dir`.
    pub journal_file: String,
    /// Positions created this long before startup are inherited (default: 5m).
    #[serde(with = "duration")]
    pub startup_grace: Duration,
    /// Positions older than this many days are treated as external (default: 7).
    pub stale_after_days: u32,
    /// Number of trailing journal lines searched for a matching entry (default: 1000).
    pub journal_lookback_lines: usize,
    /// Entry price tolerance for a journal match, in quote units (default: 10.0).
    pub price_tolerance: f64,
    /// Retained history records (default: 1000).
    pub history_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            journal_file: "trade_journal.csv".to_string(),
            startup_grace: Duration::from_secs(5 * 60),
            stale_after_days: 7,
            journal_lookback_lines: 1000,
            price_tolerance: 10.0,
            history_limit: 1000,
        }
    }
}

impl TrackerConfig {
    /// Replaces unusable values with the built-in defaults.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        Self {
            data_dir: if self.data_dir.trim().is_empty() {
                d.data_dir
            } else {
                self.data_dir
            },
            journal_file: if self.journal_file.trim().is_empty() {
                d.journal_file
            } else {
                self.journal_file
            },
            startup_grace: non_zero(self.startup_grace, d.startup_grace, "tracker", "startup_grace"),
            stale_after_days: self.stale_after_days,
            journal_lookback_lines: if self.journal_lookback_lines == 0 {
                d.journal_lookback_lines
            } else {
                self.journal_lookback_lines
            },
            price_tolerance: non_negative(
                self.price_tolerance,
                d.price_tolerance,
                "tracker",
                "price_tolerance",
            ),
            history_limit: if self.history_limit == 0 {
                d.history_limit
            } else {
                self.history_limit
            },
        }
    }
}
