//! Exchange-reported open positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Side;

/// ExchangePosition is one record of the exchange position feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// Instrument symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Position direction.
    pub side: Side,
    /// Position size in base units. Zero-size records are ignored.
    pub size: f64,
    /// Average entry price.
    pub avg_price: f64,
    /// Unrealized PnL as reported by the exchange.
    #[serde(default)]
    pub unrealized_pnl: f64,
    /// When the exchange says the position was opened.
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

impl ExchangePosition {
    /// Returns true for records that describe an actual open position.
    pub fn is_open(&self) -> bool {
        self.size.is_finite() && self.size != 0.0
    }
}
