//! Secondary risk heuristics: directional concentration and market turbulence.
//!
//! Both are layered on top of the hard limits, so an error here never blocks
//! trading on its own.

use serde::Serialize;
use std::fmt;

use super::{PositionRisk, RiskError};
use crate::domain::{Candle, MarketData, Side};

const VOLATILITY_WINDOW: usize = 10;
const MOVE_WINDOW: usize = 5;
const HIGH_VOLATILITY: f64 = 0.05;
const SHARP_MOVE: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl MarketRiskLevel {
    fn from_factors(factors: usize) -> Self {
        match factors {
            0 => MarketRiskLevel::Low,
            1 => MarketRiskLevel::Medium,
            2 | 3 => MarketRiskLevel::High,
            _ => MarketRiskLevel::Critical,
        }
    }
}

impl fmt::Display for MarketRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketRiskLevel::Low => "low",
            MarketRiskLevel::Medium => "medium",
            MarketRiskLevel::High => "high",
            MarketRiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Share of open notional on `side`, in percent. `None` when nothing is open.
pub fn correlation_exposure<'a>(
    positions: impl IntoIterator<Item = &'a PositionRisk>,
    side: Side,
) -> Result<Option<f64>, RiskError> {
    let mut total = 0.0;
    let mut same_side = 0.0;

    for position in positions {
        let exposure = (position.size * position.current_price).abs();
        if !exposure.is_finite() {
            return Err(RiskError::Analytics(format!(
                "non-finite exposure for {} {}",
                position.strategy, position.symbol
            )));
        }
        total += exposure;
        if position.side == side {
            same_side += exposure;
        }
    }

    if total > 0.0 {
        Ok(Some(same_side / total * 100.0))
    } else {
        Ok(None)
    }
}

/// Counts turbulence factors across timeframes and maps them to a level.
pub fn assess_market_risk(market_data: &MarketData) -> Result<MarketRiskLevel, RiskError> {
    let mut factors = 0;

    for (timeframe, candles) in market_data {
        if candles.len() <= VOLATILITY_WINDOW {
            continue;
        }

        if average_range(&candles[candles.len() - VOLATILITY_WINDOW..], timeframe)?
            > HIGH_VOLATILITY
        {
            factors += 1;
        }

        if max_abs_change(&candles[candles.len() - MOVE_WINDOW - 1..], timeframe)? > SHARP_MOVE {
            factors += 1;
        }
    }

    Ok(MarketRiskLevel::from_factors(factors))
}

fn average_range(candles: &[Candle], timeframe: &str) -> Result<f64, RiskError> {
    let mut sum = 0.0;
    for candle in candles {
        let range = (candle.high - candle.low) / candle.close;
        if !range.is_finite() {
            return Err(RiskError::Analytics(format!(
                "invalid candle range in {}",
                timeframe
            )));
        }
        sum += range;
    }
    Ok(sum / candles.len() as f64)
}

/// Largest absolute bar-to-bar return over `candles`.
fn max_abs_change(candles: &[Candle], timeframe: &str) -> Result<f64, RiskError> {
    let mut max = 0.0_f64;
    for pair in candles.windows(2) {
        let change = (pair[1].close / pair[0].close - 1.0).abs();
        if !change.is_finite() {
            return Err(RiskError::Analytics(format!(
                "invalid close price in {}",
                timeframe
            )));
        }
        max = max.max(change);
    }
    Ok(max)
}
