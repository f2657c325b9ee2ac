//! Trade direction and order placement acknowledgments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side represents the direction of a position or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Buy opens or extends a long position.
    #[serde(alias = "BUY", alias = "buy", alias = "Long", alias = "long", alias = "LONG")]
    Buy,
    /// Sell opens or extends a short position.
    #[serde(alias = "SELL", alias = "sell", alias = "Short", alias = "short", alias = "SHORT")]
    Sell,
}

impl Side {
    /// Upper-case label as written in the trade journal.
    pub fn as_journal_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Side::Buy),
            "SELL" | "SHORT" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// OrderAck is the exchange acknowledgment of an order placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Whether the exchange accepted the order.
    pub success: bool,
    /// Exchange-assigned order ID.
    pub order_id: Option<String>,
    /// Filled quantity in base units.
    pub filled_qty: f64,
}

impl OrderAck {
    /// An accepted order with the given fill.
    pub fn filled(order_id: impl Into<String>, filled_qty: f64) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            filled_qty,
        }
    }

    /// A rejected order.
    pub fn rejected() -> Self {
        Self {
            success: false,
            order_id: None,
            filled_qty: 0.0,
        }
    }
}
