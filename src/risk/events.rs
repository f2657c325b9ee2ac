//! Append-only risk event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::storage::Versioned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    CriticalLoss,
    EmergencyStop,
    StrategyBlocked,
    Other,
}

/// RiskEvent is one audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: RiskEventKind,
    pub payload: Value,
}

impl RiskEvent {
    pub fn new(kind: RiskEventKind, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }

    pub fn critical_loss(strategy: &str, symbol: &str, loss_pct: f64) -> Self {
        Self::new(
            RiskEventKind::CriticalLoss,
            json!({ "strategy": strategy, "symbol": symbol, "loss_pct": loss_pct }),
        )
    }

    pub fn emergency_stop(reason: &str, open_positions: usize) -> Self {
        Self::new(
            RiskEventKind::EmergencyStop,
            json!({ "reason": reason, "open_positions": open_positions }),
        )
    }

    pub fn strategy_blocked(strategy: &str, reason: &str, duration_secs: u64) -> Self {
        Self::new(
            RiskEventKind::StrategyBlocked,
            json!({ "strategy": strategy, "reason": reason, "duration_secs": duration_secs }),
        )
    }

    pub fn other(event: &str, details: Value) -> Self {
        Self::new(
            RiskEventKind::Other,
            json!({ "event": event, "details": details }),
        )
    }
}

/// Persisted audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AuditLogDoc {
    pub version: u32,
    pub events: Vec<RiskEvent>,
}

impl Versioned for AuditLogDoc {
    const SCHEMA_VERSION: u32 = 1;

    fn schema_version(&self) -> u32 {
        self.version
    }
}
