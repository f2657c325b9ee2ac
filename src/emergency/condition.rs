//! Named halt conditions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// The fixed set of conditions the monitor evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Equity dropped too far below the baseline captured at monitor start.
    CriticalLoss,
    /// Margin utilization near liquidation. Currently never triggers.
    MarginCall,
    /// Losing trades in a row.
    ConsecutiveLosses,
    /// Failed exchange calls in a row.
    ApiErrors,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 4] = [
        ConditionKind::CriticalLoss,
        ConditionKind::MarginCall,
        ConditionKind::ConsecutiveLosses,
        ConditionKind::ApiErrors,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConditionKind::CriticalLoss => "critical_loss",
            ConditionKind::MarginCall => "margin_call",
            ConditionKind::ConsecutiveLosses => "consecutive_losses",
            ConditionKind::ApiErrors => "api_errors",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// EmergencyCondition is the last observed state of one halt condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyCondition {
    pub kind: ConditionKind,
    pub name: String,
    pub threshold: f64,
    pub current_value: f64,
    /// Sticky until an explicit reset.
    pub triggered: bool,
    pub trigger_time: Option<DateTime<Utc>>,
}

impl EmergencyCondition {
    pub fn new(kind: ConditionKind, threshold: f64) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            threshold,
            current_value: 0.0,
            triggered: false,
            trigger_time: None,
        }
    }

    /// Records an observation. Returns true when this call triggered the condition.
    pub(crate) fn observe(&mut self, value: f64, crossed: bool, now: DateTime<Utc>) -> bool {
        self.current_value = value;
        if crossed && !self.triggered {
            self.triggered = true;
            self.trigger_time = Some(now);
            return true;
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        self.current_value = 0.0;
        self.triggered = false;
        self.trigger_time = None;
    }
}
