//! Risk limit configuration: global limits plus per-strategy overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::non_negative;

/// Per-trade and per-strategy limits enforced by the pre-trade gate.
///
/// Percent fields are expressed in percent (`5.0` means 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum trades a strategy may register per UTC day.
    pub max_daily_trades: u32,
    /// Maximum concurrently open positions per strategy.
    pub max_open_positions: u32,
    /// Maximum realized daily loss as percent of current balance.
    pub max_daily_loss_pct: f64,
    /// Maximum single position notional as percent of current balance.
    pub max_position_size_pct: f64,
    /// Maximum share of open exposure on the same side as a new signal, in percent.
    pub max_correlation_exposure: f64,
    /// Maximum tolerated drawdown, in percent.
    pub max_drawdown_pct: f64,
    /// Minimum acceptable reward / risk ratio when both stops are set.
    pub min_risk_reward_ratio: f64,
    /// Maximum leverage.
    pub max_leverage: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_trades: 20,
            max_open_positions: 3,
            max_daily_loss_pct: 5.0,
            max_position_size_pct: 2.0,
            max_correlation_exposure: 50.0,
            max_drawdown_pct: 10.0,
            min_risk_reward_ratio: 1.0,
            max_leverage: 1.0,
        }
    }
}

impl RiskLimits {
    /// Replaces negative or non-finite values with the built-in defaults.
    pub fn sanitized(self, scope: &str) -> Self {
        let d = Self::default();
        Self {
            max_daily_trades: self.max_daily_trades,
            max_open_positions: self.max_open_positions,
            max_daily_loss_pct: non_negative(
                self.max_daily_loss_pct,
                d.max_daily_loss_pct,
                scope,
                "max_daily_loss_pct",
            ),
            max_position_size_pct: non_negative(
                self.max_position_size_pct,
                d.max_position_size_pct,
                scope,
                "max_position_size_pct",
            ),
            max_correlation_exposure: non_negative(
                self.max_correlation_exposure,
                d.max_correlation_exposure,
                scope,
                "max_correlation_exposure",
            ),
            max_drawdown_pct: non_negative(
                self.max_drawdown_pct,
                d.max_drawdown_pct,
                scope,
                "max_drawdown_pct",
            ),
            min_risk_reward_ratio: non_negative(
                self.min_risk_reward_ratio,
                d.min_risk_reward_ratio,
                scope,
                "min_risk_reward_ratio",
            ),
            max_leverage: non_negative(self.max_leverage, d.max_leverage, scope, "max_leverage"),
        }
    }
}

/// Partial override of [`RiskLimits`] for a single strategy.
///
/// Unset keys inherit the global limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLimitsOverride {
    pub max_daily_trades: Option<u32>,
    pub max_open_positions: Option<u32>,
    pub max_daily_loss_pct: Option<f64>,
    pub max_position_size_pct: Option<f64>,
    pub max_correlation_exposure: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub min_risk_reward_ratio: Option<f64>,
    pub max_leverage: Option<f64>,
}

impl RiskLimitsOverride {
    /// Merges this override over `base`.
    pub fn apply(&self, base: &RiskLimits) -> RiskLimits {
        RiskLimits {
            max_daily_trades: self.max_daily_trades.unwrap_or(base.max_daily_trades),
            max_open_positions: self.max_open_positions.unwrap_or(base.max_open_positions),
            max_daily_loss_pct: self.max_daily_loss_pct.unwrap_or(base.max_daily_loss_pct),
            max_position_size_pct: self
                .max_position_size_pct
                .unwrap_or(base.max_position_size_pct),
            max_correlation_exposure: self
                .max_correlation_exposure
                .unwrap_or(base.max_correlation_exposure),
            max_drawdown_pct: self.max_drawdown_pct.unwrap_or(base.max_drawdown_pct),
            min_risk_reward_ratio: self
                .min_risk_reward_ratio
                .unwrap_or(base.min_risk_reward_ratio),
            max_leverage: self.max_leverage.unwrap_or(base.max_leverage),
        }
    }
}

/// Risk manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Limits applied to every strategy without an override.
    pub global_limits: RiskLimits,
    /// Per-strategy overrides keyed by strategy name.
    pub strategy_limits: HashMap<String, RiskLimitsOverride>,
    /// Daily counters and risk events older than this are pruned (default: 30).
    pub event_retention_days: u32,
    /// Upper bound on retained risk events (default: 1000).
    pub max_risk_events: usize,
    /// Upper bound on retained closed-trade PnL records (default: 1000).
    pub max_pnl_history: usize,
    /// File mirroring the risk-event audit log (optional).
    pub audit_log_path: Option<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            global_limits: RiskLimits::default(),
            strategy_limits: HashMap::new(),
            event_retention_days: 30,
            max_risk_events: 1000,
            max_pnl_history: 1000,
            audit_log_path: None,
        }
    }
}

impl RiskConfig {
    /// Returns a copy with every limit set sanitized.
    pub fn sanitized(self) -> Self {
        let global_limits = self.global_limits.sanitized("risk.global_limits");
        let strategy_limits = self
            .strategy_limits
            .into_iter()
            .map(|(name, o)| {
                let scope = format!("risk.strategy_limits.{}", name);
                let merged = o.apply(&global_limits).sanitized(&scope);
                let fixed = RiskLimitsOverride {
                    max_daily_trades: o.max_daily_trades,
                    max_open_positions: o.max_open_positions,
                    max_daily_loss_pct: o.max_daily_loss_pct.map(|_| merged.max_daily_loss_pct),
                    max_position_size_pct: o
                        .max_position_size_pct
                        .map(|_| merged.max_position_size_pct),
                    max_correlation_exposure: o
                        .max_correlation_exposure
                        .map(|_| merged.max_correlation_exposure),
                    max_drawdown_pct: o.max_drawdown_pct.map(|_| merged.max_drawdown_pct),
                    min_risk_reward_ratio: o
                        .min_risk_reward_ratio
                        .map(|_| merged.min_risk_reward_ratio),
                    max_leverage: o.max_leverage.map(|_| merged.max_leverage),
                };
                (name, fixed)
            })
            .collect();

        let defaults = Self::default();
        Self {
            global_limits,
            strategy_limits,
            event_retention_days: if self.event_retention_days == 0 {
                defaults.event_retention_days
            } else {
                self.event_retention_days
            },
            max_risk_events: if self.max_risk_events == 0 {
                defaults.max_risk_events
            } else {
                self.max_risk_events
            },
            max_pnl_history: if self.max_pnl_history == 0 {
                defaults.max_pnl_history
            } else {
                self.max_pnl_history
            },
            audit_log_path: self.audit_log_path,
        }
    }
}
