//! Candidate trade signals and the market data attached to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Side;

/// One OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }
}

/// Recent candles keyed by timeframe label ("1m", "15m", "1h", ...), oldest first.
pub type MarketData = BTreeMap<String, Vec<Candle>>;

/// TradeSignal is a strategy's proposal to open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Instrument symbol.
    pub symbol: String,
    /// Proposed direction.
    pub side: Side,
    /// Expected entry price.
    pub entry_price: f64,
    /// Proposed position value in quote currency.
    pub notional: f64,
    /// Smallest position value the strategy may trade, if it has one.
    #[serde(default)]
    pub min_notional: Option<f64>,
    /// Protective stop price.
    #[serde(default)]
    pub stop_loss: Option<f64>,
    /// Profit target price.
    #[serde(default)]
    pub take_profit: Option<f64>,
    /// Recent candles used by the market-risk assessment.
    #[serde(default)]
    pub market_data: MarketData,
}

impl TradeSignal {
    pub fn new(symbol: impl Into<String>, side: Side, entry_price: f64, notional: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            notional,
            min_notional: None,
            stop_loss: None,
            take_profit: None,
            market_data: MarketData::new(),
        }
    }

    pub fn with_stops(mut self, stop_loss: f64, take_profit: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_min_notional(mut self, min_notional: f64) -> Self {
        self.min_notional = Some(min_notional);
        self
    }

    pub fn with_market_data(mut self, market_data: MarketData) -> Self {
        self.market_data = market_data;
        self
    }

    /// Reward / risk ratio when both a non-zero stop and target are set.
    pub fn risk_reward_ratio(&self) -> Option<f64> {
        let stop_loss = self.stop_loss.filter(|v| *v != 0.0)?;
        let take_profit = self.take_profit.filter(|v| *v != 0.0)?;
        if self.entry_price == 0.0 {
            return None;
        }

        let (risk, reward) = match self.side {
            Side::Buy => (
                (self.entry_price - stop_loss).abs(),
                (take_profit - self.entry_price).abs(),
            ),
            Side::Sell => (
                (stop_loss - self.entry_price).abs(),
                (self.entry_price - take_profit).abs(),
            ),
        };

        Some(if risk > 0.0 { reward / risk } else { 0.0 })
    }
}
