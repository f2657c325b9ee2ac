//! Read-only views over the risk manager state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::RiskEvent;
use crate::config::RiskLimits;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStats {
    pub positions: usize,
    pub exposure: f64,
    pub unrealized_pnl: f64,
}

/// Snapshot returned by `RiskManager::get_risk_report`.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub timestamp: DateTime<Utc>,
    pub emergency_stop: bool,
    pub blocked_strategies: Vec<String>,
    pub daily_trades: u32,
    pub daily_trades_by_strategy: BTreeMap<String, u32>,
    pub daily_pnl: f64,
    pub open_positions_count: usize,
    pub total_exposure: f64,
    pub total_unrealized_pnl: f64,
    pub strategy_stats: BTreeMap<String, StrategyStats>,
    pub recent_risk_events: Vec<RiskEvent>,
    pub limits: RiskLimits,
}

/// Outcome of `RiskManager::reconcile_positions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Exchange positions with no local counterpart, now adopted.
    pub orphaned_positions: usize,
    /// Local positions absent on the exchange, now dropped.
    pub missing_positions: usize,
    /// Local positions refreshed from the exchange.
    pub synced_positions: usize,
}

/// A closed trade kept in the bounded PnL history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub symbol: String,
    pub side: crate::domain::Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub hold_secs: i64,
}
