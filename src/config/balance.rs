//! Balance validator configuration.

use serde::{Deserialize, Serialize};

use super::non_negative;

/// Thresholds used by the margin/equity sufficiency gate.
///
/// All fractions are decimals (`0.05` means 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Cash that must remain after the trade, as a fraction of the reserve-currency balance.
    pub min_balance_reserve: f64,
    /// Equity below this fraction of initial equity halts trading.
    pub emergency_balance_threshold: f64,
    /// Share of equity that used plus required margin may occupy.
    pub max_leverage_utilization: f64,
    /// Largest single position notional as a fraction of equity.
    pub max_position_fraction: f64,
    /// Margin inflation covering fees and slippage.
    pub margin_buffer: f64,
    /// Reference price used when no live price is available.
    pub fallback_price: f64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            min_balance_reserve: 0.05,
            emergency_balance_threshold: 0.02,
            max_leverage_utilization: 0.8,
            max_position_fraction: 0.2,
            margin_buffer: 0.10,
            fallback_price: 50_000.0,
        }
    }
}

impl BalanceConfig {
    /// Replaces negative or non-finite values with the built-in defaults.
    pub fn sanitized(self) -> Self {
        let d = Self::default();
        let fallback_price = if self.fallback_price.is_finite() && self.fallback_price > 0.0 {
            self.fallback_price
        } else {
            non_negative(-1.0, d.fallback_price, "balance", "fallback_price")
        };
        Self {
            min_balance_reserve: non_negative(
                self.min_balance_reserve,
                d.min_balance_reserve,
                "balance",
                "min_balance_reserve",
            ),
            emergency_balance_threshold: non_negative(
                self.emergency_balance_threshold,
                d.emergency_balance_threshold,
                "balance",
                "emergency_balance_threshold",
            ),
            max_leverage_utilization: non_negative(
                self.max_leverage_utilization,
                d.max_leverage_utilization,
                "balance",
                "max_leverage_utilization",
            ),
            max_position_fraction: non_negative(
                self.max_position_fraction,
                d.max_position_fraction,
                "balance",
                "max_position_fraction",
            ),
            margin_buffer: non_negative(self.margin_buffer, d.margin_buffer, "balance", "margin_buffer"),
            fallback_price,
        }
    }
}
