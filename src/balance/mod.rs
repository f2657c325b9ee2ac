//! Margin and equity sufficiency gate.
//!
//! Every call fetches a fresh balance snapshot and runs the checks in a fixed
//! order, stopping at the first failure. Any failure to obtain data rejects
//! the trade.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::BalanceConfig;
use crate::domain::BalanceSnapshot;
use crate::exchanges::{self, AccountData, ExchangeError, PriceFeed};

/// Outcome of [`BalanceValidator::validate_trade_balance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceCheck {
    pub allowed: bool,
    pub reason: String,
    /// Raw snapshot the decision was based on, when one was obtained.
    pub snapshot: Option<BalanceSnapshot>,
    /// Margin the trade would lock, including the fee buffer.
    pub required_margin: Option<f64>,
}

impl BalanceCheck {
    fn reject(reason: impl Into<String>, snapshot: Option<BalanceSnapshot>, margin: Option<f64>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            snapshot,
            required_margin: margin,
        }
    }
}

/// Outcome of [`BalanceValidator::check_emergency_stop_conditions`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HaltCheck {
    pub must_halt: bool,
    pub reason: String,
}

/// BalanceValidator answers whether the account can carry a new trade.
pub struct BalanceValidator {
    config: BalanceConfig,
    prices: Option<Arc<dyn PriceFeed>>,
}

impl BalanceValidator {
    pub fn new(config: BalanceConfig) -> Self {
        Self {
            config,
            prices: None,
        }
    }

    /// Uses `prices` for reference prices instead of the fallback constant.
    pub fn with_price_feed(mut self, prices: Arc<dyn PriceFeed>) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Checks that the account can open `trade_amount` base units of `symbol`.
    pub async fn validate_trade_balance(
        &self,
        account: &dyn AccountData,
        trade_amount: f64,
        symbol: &str,
        leverage: f64,
    ) -> BalanceCheck {
        if !trade_amount.is_finite() || trade_amount <= 0.0 {
            return BalanceCheck::reject(
                format!("invalid trade amount: {}", trade_amount),
                None,
                None,
            );
        }

        let snapshot = match fetch_snapshot(account).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(account = %account.name(), error = %e, "Balance snapshot unavailable");
                return BalanceCheck::reject(format!("no balance data: {}", e), None, None);
            }
        };

        let price = self.reference_price(symbol).await;
        let notional = trade_amount * price;
        let required_margin = self.required_margin(notional, leverage);

        // Reserve: cash left after the trade must cover a fraction of the reserve-currency balance.
        let balance_after_trade = snapshot.available_balance - required_margin;
        let min_reserve = snapshot.reserve_balance * self.config.min_balance_reserve;

        debug!(
            symbol = %symbol,
            required_margin,
            available = snapshot.available_balance,
            after_trade = balance_after_trade,
            min_reserve,
            "Balance check"
        );

        if balance_after_trade < min_reserve {
            return BalanceCheck::reject(
                format!(
                    "insufficient balance: required {:.4} + reserve {:.4}, available {:.4}",
                    required_margin, min_reserve, snapshot.available_balance
                ),
                Some(snapshot),
                Some(required_margin),
            );
        }

        if snapshot.available_balance < required_margin {
            return BalanceCheck::reject(
                format!(
                    "insufficient margin: required {:.4}, available {:.4}",
                    required_margin, snapshot.available_balance
                ),
                Some(snapshot),
                Some(required_margin),
            );
        }

        let critical_equity = snapshot.baseline_equity() * self.config.emergency_balance_threshold;
        if snapshot.total_equity < critical_equity {
            warn!(
                equity = snapshot.total_equity,
                critical_equity, "Equity below critical level"
            );
            return BalanceCheck::reject(
                format!(
                    "critical equity level: {:.2} < {:.2}, trading halted",
                    snapshot.total_equity, critical_equity
                ),
                Some(snapshot),
                Some(required_margin),
            );
        }

        let total_margin_after = snapshot.used_margin + required_margin;
        let max_allowed_margin = snapshot.total_equity * self.config.max_leverage_utilization;
        if total_margin_after > max_allowed_margin {
            return BalanceCheck::reject(
                format!(
                    "leverage limit exceeded: total margin {:.4}, limit {:.4}",
                    total_margin_after, max_allowed_margin
                ),
                Some(snapshot),
                Some(required_margin),
            );
        }

        let max_position_value = snapshot.total_equity * self.config.max_position_fraction;
        if notional > max_position_value {
            return BalanceCheck::reject(
                format!(
                    "position too large: {:.2}, limit {:.2}",
                    notional, max_position_value
                ),
                Some(snapshot),
                Some(required_margin),
            );
        }

        info!(
            symbol = %symbol,
            available = snapshot.available_balance,
            required_margin,
            "Balance check passed"
        );

        BalanceCheck {
            allowed: true,
            reason: "balance sufficient".to_string(),
            snapshot: Some(snapshot),
            required_margin: Some(required_margin),
        }
    }

    /// Derives a halt decision from a balance snapshot alone.
    ///
    /// Missing data means halt.
    pub async fn check_emergency_stop_conditions(&self, account: &dyn AccountData) -> HaltCheck {
        let snapshot = match fetch_snapshot(account).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(account = %account.name(), error = %e, "Emergency check without balance data");
                return HaltCheck {
                    must_halt: true,
                    reason: format!("no balance data: {}", e),
                };
            }
        };

        let initial_equity = snapshot.baseline_equity();
        if snapshot.total_equity < initial_equity * self.config.emergency_balance_threshold {
            return HaltCheck {
                must_halt: true,
                reason: format!(
                    "critical capital loss: equity {:.2}, initial {:.2}",
                    snapshot.total_equity, initial_equity
                ),
            };
        }

        if snapshot.available_balance <= 0.0 {
            return HaltCheck {
                must_halt: true,
                reason: format!(
                    "non-positive available balance: {:.2}",
                    snapshot.available_balance
                ),
            };
        }

        HaltCheck {
            must_halt: false,
            reason: "all balance conditions normal".to_string(),
        }
    }

    /// Margin for a position of `notional` value at `leverage`, inflated by the fee buffer.
    pub fn required_margin(&self, notional: f64, leverage: f64) -> f64 {
        let leverage = if leverage.is_finite() { leverage.max(1.0) } else { 1.0 };
        notional / leverage * (1.0 + self.config.margin_buffer)
    }

    async fn reference_price(&self, symbol: &str) -> f64 {
        let Some(prices) = &self.prices else {
            return self.config.fallback_price;
        };

        match prices.get_reference_price(symbol).await {
            Ok(price) if price.is_finite() && price > 0.0 => price,
            Ok(price) => {
                warn!(symbol = %symbol, price, "Unusable reference price, using fallback");
                self.config.fallback_price
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Reference price unavailable, using fallback");
                self.config.fallback_price
            }
        }
    }
}

/// Fetches a snapshot and rejects malformed numbers.
pub async fn fetch_snapshot(account: &dyn AccountData) -> exchanges::Result<BalanceSnapshot> {
    let snapshot = account.get_wallet_balance().await?;
    if !snapshot.is_well_formed() {
        return Err(ExchangeError::NoData(
            "balance snapshot contains non-finite values".to_string(),
        ));
    }
    Ok(snapshot)
}
