//! Account balance snapshots.

use serde::{Deserialize, Serialize};

/// BalanceSnapshot is a point-in-time view of the trading account.
///
/// All values are in the account's quote currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Balance available for new margin.
    pub available_balance: f64,
    /// Margin already locked by open positions.
    pub used_margin: f64,
    /// Total equity including unrealized PnL and non-cash holdings.
    pub total_equity: f64,
    /// Cash balance in the reserve currency.
    pub reserve_balance: f64,
    /// Equity baseline recorded by the account source, if it keeps one.
    pub initial_equity: Option<f64>,
}

impl BalanceSnapshot {
    /// Equity baseline, defaulting to the current total equity.
    pub fn baseline_equity(&self) -> f64 {
        self.initial_equity.unwrap_or(self.total_equity)
    }

    /// Returns true when every field is a finite number.
    pub fn is_well_formed(&self) -> bool {
        self.available_balance.is_finite()
            && self.used_margin.is_finite()
            && self.total_equity.is_finite()
            && self.reserve_balance.is_finite()
            && self.initial_equity.is_none_or(f64::is_finite)
    }
}
