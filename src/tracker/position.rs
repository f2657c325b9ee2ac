//! Tracked positions, their provenance and the persisted documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::Side;
use crate::storage::Versioned;

/// Who opened a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOrigin {
    /// Opened by this trading system.
    System,
    /// Opened by a human or another program.
    External,
    /// Already open before this process started.
    Inherited,
    Unknown,
}

impl PositionOrigin {
    pub const ALL: [PositionOrigin; 4] = [
        PositionOrigin::System,
        PositionOrigin::External,
        PositionOrigin::Inherited,
        PositionOrigin::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionOrigin::System => "system",
            PositionOrigin::External => "external",
            PositionOrigin::Inherited => "inherited",
            PositionOrigin::Unknown => "unknown",
        }
    }

    /// Human-readable provenance note.
    pub fn comment(&self, age_days: f64) -> String {
        match self {
            PositionOrigin::System => "Opened by trading system".to_string(),
            PositionOrigin::External => "Opened externally (manual trading)".to_string(),
            PositionOrigin::Inherited => {
                format!("Inherited from before system startup ({:.1} days old)", age_days)
            }
            PositionOrigin::Unknown => "Unknown origin".to_string(),
        }
    }
}

impl fmt::Display for PositionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scrutiny level assigned to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// TrackedPosition is one position the tracker knows about.
///
/// Positions are never mutated; closing one moves it into history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub origin: PositionOrigin,
    pub strategy: Option<String>,
    /// When the tracker first recorded the position.
    pub created_time: DateTime<Utc>,
    /// Creation time reported by the exchange, if any.
    pub exchange_created_time: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub comment: String,
}

impl TrackedPosition {
    /// Age in fractional days according to the exchange timestamp; zero when unknown.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        age_days(self.exchange_created_time, now)
    }
}

pub(crate) fn age_days(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match created {
        Some(t) => (now - t).num_seconds() as f64 / 86_400.0,
        None => 0.0,
    }
}

/// Builds the tracker key: symbol, side, whole-unit entry price and size in millionths.
pub fn position_key(symbol: &str, side: Side, entry_price: f64, size: f64) -> String {
    format!(
        "{}_{}_{}_{}",
        symbol,
        side,
        entry_price as i64,
        (size * 1_000_000.0) as i64
    )
}

/// Classification of one exchange position, as returned by a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub origin: PositionOrigin,
    pub is_system: bool,
    pub strategy: Option<String>,
    pub age_days: f64,
    pub risk_level: RiskLevel,
    pub comment: String,
    /// True when this scan added the position to the tracker.
    pub newly_discovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Opened,
    Discovered,
    Closed,
}

/// Immutable history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub position: TrackedPosition,
}

/// Persisted snapshot of the live map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TrackedPositionsDoc {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub positions: BTreeMap<String, TrackedPosition>,
}

impl Versioned for TrackedPositionsDoc {
    const SCHEMA_VERSION: u32 = 1;

    fn schema_version(&self) -> u32 {
        self.version
    }

    fn validate(&self) -> Result<(), String> {
        for (key, pos) in &self.positions {
            if key.is_empty() || pos.symbol.is_empty() {
                return Err("position with empty key or symbol".to_string());
            }
            if !pos.size.is_finite() || !pos.entry_price.is_finite() {
                return Err(format!("position {} has non-finite size or price", key));
            }
        }
        Ok(())
    }
}

/// Persisted bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PositionHistoryDoc {
    pub version: u32,
    pub records: Vec<PositionRecord>,
}

impl Versioned for PositionHistoryDoc {
    const SCHEMA_VERSION: u32 = 1;

    fn schema_version(&self) -> u32 {
        self.version
    }
}
