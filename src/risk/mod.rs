//! Pre-trade gate and per-strategy risk bookkeeping.
//!
//! The gate checks, in order, the global emergency stop, strategy blocks,
//! daily trade and loss limits, open position and size limits, risk/reward,
//! directional concentration, market turbulence and trading hours. When an
//! account is supplied the balance validator runs last, outside the lock.
//!
//! The gate is best-effort: a concurrent `register_trade` between a check and
//! its registration is not serialized with it. This is sufficient for a
//! single trading loop; multiple order submitters would need the check and
//! the registration under one lock.

mod analytics;
mod error;
mod events;
mod report;

pub use analytics::{MarketRiskLevel, assess_market_risk, correlation_exposure};
pub use error::RiskError;
pub use events::{RiskEvent, RiskEventKind};
pub use report::{ClosedTrade, ReconcileReport, RiskReport, StrategyStats};

pub use crate::config::{RiskLimits, RiskLimitsOverride};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::balance::BalanceValidator;
use crate::config::RiskConfig;
use crate::domain::{ExchangePosition, OrderAck, Side, TradeSignal};
use crate::emergency::EmergencyStopManager;
use crate::exchanges::AccountData;
use crate::notification::{
    BlockCategory, BlockData, EmergencyResetData, EmergencyStopData, Event, Notifier,
    RiskAlertData,
};
use crate::storage::{JsonFileStore, Versioned};

use events::AuditLogDoc;

const SOURCE: &str = "risk_manager";
const ORPHANED_STRATEGY: &str = "orphaned_unknown";
const CRITICAL_LOSS_PCT: f64 = -2.0;
const RECENT_EVENTS: usize = 10;

/// PositionRisk is one open, risk-tracked position. Keyed by strategy and symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRisk {
    pub strategy: String,
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    /// Position value as percent of balance at the last update.
    pub risk_pct: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
}

impl PositionRisk {
    pub fn exposure(&self) -> f64 {
        self.size * self.current_price
    }

    fn stop_loss_crossed(&self) -> bool {
        match self.stop_loss.filter(|sl| *sl > 0.0) {
            Some(sl) => match self.side {
                Side::Buy => self.current_price <= sl,
                Side::Sell => self.current_price >= sl,
            },
            None => false,
        }
    }
}

/// Result of the pre-trade gate.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeDecision {
    pub allowed: bool,
    pub reason: String,
    /// Set for rejections.
    pub category: Option<BlockCategory>,
}

impl TradeDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "risk within limits".to_string(),
            category: None,
        }
    }

    fn reject(category: BlockCategory, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            category: Some(category),
        }
    }
}

#[derive(Debug, Clone)]
struct StrategyBlock {
    reason: String,
    until: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    daily_trades: BTreeMap<NaiveDate, HashMap<String, u32>>,
    daily_pnl: BTreeMap<NaiveDate, f64>,
    open_positions: BTreeMap<String, PositionRisk>,
    blocked: HashMap<String, StrategyBlock>,
    emergency_stop: Option<String>,
    risk_events: Vec<RiskEvent>,
    pnl_history: Vec<ClosedTrade>,
    registered_orders: HashMap<String, NaiveDate>,
}

impl State {
    fn trades_today(&self, today: NaiveDate, strategy: &str) -> u32 {
        self.daily_trades
            .get(&today)
            .and_then(|m| m.get(strategy))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the active block, lifting it first if it has expired.
    fn active_block(&mut self, strategy: &str, now: DateTime<Utc>) -> Option<StrategyBlock> {
        let block = self.blocked.get(strategy)?.clone();
        if block.until <= now {
            self.blocked.remove(strategy);
            info!(strategy = %strategy, "Strategy block expired");
            return None;
        }
        Some(block)
    }
}

/// RiskManager enforces per-trade and per-strategy limits.
pub struct RiskManager {
    config: RiskConfig,
    notifier: Arc<dyn Notifier>,
    emergency: Option<Arc<EmergencyStopManager>>,
    balance: Option<Arc<BalanceValidator>>,
    audit_log: Option<JsonFileStore<AuditLogDoc>>,
    state: Mutex<State>,
}

impl RiskManager {
    /// Creates a manager, reloading the audit log when one is configured.
    pub fn new(config: RiskConfig, notifier: Arc<dyn Notifier>) -> Self {
        let audit_log = config
            .audit_log_path
            .as_ref()
            .map(|path| JsonFileStore::<AuditLogDoc>::new(path));
        let risk_events = audit_log
            .as_ref()
            .and_then(|store| store.load_or_empty())
            .map(|doc| doc.events)
            .unwrap_or_default();

        info!(
            strategies_with_overrides = config.strategy_limits.len(),
            risk_events = risk_events.len(),
            "Risk manager initialized"
        );

        Self {
            config,
            notifier,
            emergency: None,
            balance: None,
            audit_log,
            state: Mutex::new(State {
                risk_events,
                ..State::default()
            }),
        }
    }

    /// Consults `emergency` in the first gate check and feeds it trade results.
    pub fn with_emergency_stop(mut self, emergency: Arc<EmergencyStopManager>) -> Self {
        self.emergency = Some(emergency);
        self
    }

    /// Runs `balance` after the in-memory checks when an account is supplied.
    pub fn with_balance_validator(mut self, balance: Arc<BalanceValidator>) -> Self {
        self.balance = Some(balance);
        self
    }

    /// Effective limits for a strategy: its override merged over the global limits.
    pub fn get_strategy_limits(&self, strategy: &str) -> RiskLimits {
        match self.config.strategy_limits.get(strategy) {
            Some(o) => o.apply(&self.config.global_limits),
            None => self.config.global_limits.clone(),
        }
    }

    /// Decides whether `strategy` may open `signal`.
    pub async fn check_pre_trade_risk(
        &self,
        strategy: &str,
        signal: &TradeSignal,
        current_balance: f64,
        account: Option<&dyn AccountData>,
    ) -> TradeDecision {
        let limits = self.get_strategy_limits(strategy);

        let decision = self.check_limits(strategy, signal, current_balance, &limits);
        if !decision.allowed {
            return self.blocked(strategy, signal, decision);
        }

        if let (Some(validator), Some(account)) = (&self.balance, account) {
            let amount = if signal.entry_price > 0.0 {
                signal.notional / signal.entry_price
            } else {
                0.0
            };
            let check = validator
                .validate_trade_balance(account, amount, &signal.symbol, limits.max_leverage)
                .await;
            if !check.allowed {
                return self.blocked(
                    strategy,
                    signal,
                    TradeDecision::reject(BlockCategory::BalanceInsufficient, check.reason),
                );
            }
        }

        debug!(strategy = %strategy, symbol = %signal.symbol, "Pre-trade risk passed");
        decision
    }

    /// The ten in-memory checks, against one consistent snapshot.
    fn check_limits(
        &self,
        strategy: &str,
        signal: &TradeSignal,
        current_balance: f64,
        limits: &RiskLimits,
    ) -> TradeDecision {
        let now = Utc::now();
        let today = now.date_naive();

        // Read before taking our own lock; the two components never nest locks.
        let global = self.emergency.as_ref().map(|e| e.is_trading_allowed());

        let mut state = self.state.lock();

        if let Some(reason) = &state.emergency_stop {
            return TradeDecision::reject(
                BlockCategory::EmergencyStop,
                format!("emergency stop active: {}", reason),
            );
        }
        if let Some((false, reason)) = global {
            return TradeDecision::reject(BlockCategory::EmergencyStop, reason);
        }

        if let Some(block) = state.active_block(strategy, now) {
            return TradeDecision::reject(
                BlockCategory::RiskLimit,
                format!("strategy {} is blocked: {}", strategy, block.reason),
            );
        }

        let trades = state.trades_today(today, strategy);
        if trades >= limits.max_daily_trades {
            return TradeDecision::reject(
                BlockCategory::RiskLimit,
                format!("daily trade limit reached ({})", limits.max_daily_trades),
            );
        }

        let daily_loss = (-state.daily_pnl.get(&today).copied().unwrap_or(0.0)).max(0.0);
        let max_daily_loss = current_balance * limits.max_daily_loss_pct / 100.0;
        if daily_loss >= max_daily_loss {
            return TradeDecision::reject(
                BlockCategory::RiskLimit,
                format!(
                    "daily loss limit reached (${:.2} >= ${:.2})",
                    daily_loss, max_daily_loss
                ),
            );
        }

        let open = state
            .open_positions
            .values()
            .filter(|p| p.strategy == strategy)
            .count();
        if open >= limits.max_open_positions as usize {
            return TradeDecision::reject(
                BlockCategory::PositionLimit,
                format!("open position limit reached ({})", limits.max_open_positions),
            );
        }

        let mut max_position_value = current_balance * limits.max_position_size_pct / 100.0;
        if let Some(floor) = signal.min_notional.filter(|f| *f > max_position_value) {
            debug!(
                strategy = %strategy,
                original_limit = max_position_value,
                min_notional = floor,
                "Raising position limit to minimum notional"
            );
            max_position_value = floor;
        }
        if signal.notional > max_position_value {
            return TradeDecision::reject(
                BlockCategory::PositionLimit,
                format!(
                    "position too large (${:.2} > ${:.2})",
                    signal.notional, max_position_value
                ),
            );
        }

        if let Some(rr) = signal.risk_reward_ratio() {
            if rr < limits.min_risk_reward_ratio {
                return TradeDecision::reject(
                    BlockCategory::RiskLimit,
                    format!(
                        "risk/reward ratio too low ({:.2} < {})",
                        rr, limits.min_risk_reward_ratio
                    ),
                );
            }
        }

        match correlation_exposure(state.open_positions.values(), signal.side) {
            Ok(Some(pct)) if pct > limits.max_correlation_exposure => {
                return TradeDecision::reject(
                    BlockCategory::RiskLimit,
                    format!(
                        "correlation exposure limit exceeded ({:.1}% > {}%)",
                        pct, limits.max_correlation_exposure
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Correlation check failed, allowing trade"),
        }

        let market_risk = assess_market_risk(&signal.market_data).unwrap_or_else(|e| {
            error!(error = %e, "Market risk assessment failed");
            MarketRiskLevel::Medium
        });
        if market_risk == MarketRiskLevel::Critical {
            return TradeDecision::reject(BlockCategory::MarketRisk, "critical market risk");
        }
        if market_risk > MarketRiskLevel::Low {
            debug!(strategy = %strategy, level = %market_risk, "Elevated market risk");
        }

        if !is_safe_trading_time(now) {
            return TradeDecision::reject(BlockCategory::RiskLimit, "unsafe trading time");
        }

        drop(state);
        TradeDecision::allow()
    }

    fn blocked(&self, strategy: &str, signal: &TradeSignal, decision: TradeDecision) -> TradeDecision {
        let category = decision.category.unwrap_or(BlockCategory::RiskLimit);
        warn!(
            strategy = %strategy,
            symbol = %signal.symbol,
            category = %category,
            reason = %decision.reason,
            "Order blocked"
        );
        self.notifier.send_async(Event::order_blocked(BlockData {
            category,
            symbol: signal.symbol.clone(),
            strategy: strategy.to_string(),
            reason: decision.reason.clone(),
        }));
        decision
    }

    /// Counts the trade for today and, for a successful fill, opens a tracked position.
    ///
    /// Returns the position key, if a position was created.
    pub fn register_trade(
        &self,
        strategy: &str,
        signal: &TradeSignal,
        ack: &OrderAck,
    ) -> Result<Option<String>, RiskError> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut state = self.state.lock();

        if let Some(order_id) = &ack.order_id {
            if state.registered_orders.contains_key(order_id) {
                warn!(strategy = %strategy, order_id = %order_id, "Trade registered twice, ignoring");
                return Err(RiskError::DuplicateOrder(order_id.clone()));
            }
            state.registered_orders.insert(order_id.clone(), today);
        }

        *state
            .daily_trades
            .entry(today)
            .or_default()
            .entry(strategy.to_string())
            .or_default() += 1;

        if !ack.success {
            debug!(strategy = %strategy, symbol = %signal.symbol, "Unfilled order counted");
            return Ok(None);
        }

        let key = format!("{}_{}", strategy, signal.symbol);
        state.open_positions.insert(
            key.clone(),
            PositionRisk {
                strategy: strategy.to_string(),
                symbol: signal.symbol.clone(),
                side: signal.side,
                size: ack.filled_qty,
                entry_price: signal.entry_price,
                current_price: signal.entry_price,
                unrealized_pnl: 0.0,
                risk_pct: 0.0,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
                opened_at: now,
            },
        );

        info!(
            key = %key,
            side = %signal.side,
            size = ack.filled_qty,
            entry_price = signal.entry_price,
            "Position registered"
        );

        Ok(Some(key))
    }

    /// Re-prices a position and raises risk events for heavy losses or a crossed stop.
    pub fn update_position(
        &self,
        strategy: &str,
        symbol: &str,
        current_price: f64,
        current_balance: f64,
    ) -> Option<PositionRisk> {
        let key = format!("{}_{}", strategy, symbol);
        let mut alerts = Vec::new();

        let updated = {
            let mut state = self.state.lock();
            let position = state.open_positions.get_mut(&key)?;

            position.current_price = current_price;
            position.unrealized_pnl = match position.side {
                Side::Buy => (current_price - position.entry_price) * position.size,
                Side::Sell => (position.entry_price - current_price) * position.size,
            };
            position.risk_pct = if current_balance > 0.0 {
                position.exposure() / current_balance * 100.0
            } else {
                0.0
            };
            let position = position.clone();

            let mut events = Vec::new();
            if current_balance > 0.0 {
                let loss_pct = position.unrealized_pnl / current_balance * 100.0;
                if loss_pct < CRITICAL_LOSS_PCT {
                    warn!(strategy = %strategy, symbol = %symbol, loss_pct, "Critical unrealized loss");
                    events.push(RiskEvent::critical_loss(strategy, symbol, loss_pct));
                    alerts.push(RiskAlertData {
                        strategy: strategy.to_string(),
                        symbol: symbol.to_string(),
                        message: "unrealized loss above 2% of balance".to_string(),
                        loss_pct: Some(loss_pct),
                    });
                }
            }

            if position.stop_loss_crossed() {
                warn!(strategy = %strategy, symbol = %symbol, price = current_price, "Price reached stop-loss");
                events.push(RiskEvent::other(
                    "stop_loss_reached",
                    json!({
                        "strategy": strategy,
                        "symbol": symbol,
                        "price": current_price,
                        "stop_loss": position.stop_loss,
                    }),
                ));
                alerts.push(RiskAlertData {
                    strategy: strategy.to_string(),
                    symbol: symbol.to_string(),
                    message: format!("price {} reached stop-loss", current_price),
                    loss_pct: None,
                });
            }

            for event in events {
                self.record_event(&mut state, event);
            }
            position
        };

        for alert in alerts {
            self.notifier.send_async(Event::risk_alert(alert));
        }

        Some(updated)
    }

    /// Removes a position, books its realized PnL and reports the result upstream.
    pub fn close_position(
        &self,
        strategy: &str,
        symbol: &str,
        exit_price: f64,
        realized_pnl: f64,
    ) -> Option<PositionRisk> {
        let key = format!("{}_{}", strategy, symbol);
        let now = Utc::now();

        let position = {
            let mut state = self.state.lock();
            let position = state.open_positions.remove(&key)?;

            *state.daily_pnl.entry(now.date_naive()).or_default() += realized_pnl;
            state.pnl_history.push(ClosedTrade {
                timestamp: now,
                strategy: strategy.to_string(),
                symbol: symbol.to_string(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price,
                pnl: realized_pnl,
                hold_secs: (now - position.opened_at).num_seconds(),
            });
            cap(&mut state.pnl_history, self.config.max_pnl_history);
            position
        };

        if let Some(emergency) = &self.emergency {
            emergency.report_trade_result(realized_pnl > 0.0);
        }

        info!(key = %key, exit_price, pnl = realized_pnl, "Position closed");
        Some(position)
    }

    /// Halts all trading through this manager until cleared.
    pub fn emergency_stop_all(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            state.emergency_stop = Some(reason.to_string());
            let event = RiskEvent::emergency_stop(reason, state.open_positions.len());
            self.record_event(&mut state, event);
        }

        error!(reason = %reason, "EMERGENCY STOP: all trading halted by risk manager");

        self.notifier.send_async(Event::emergency_stop(EmergencyStopData {
            source: SOURCE.to_string(),
            reason: reason.to_string(),
            triggered: Vec::new(),
        }));
    }

    /// Lifts a manual emergency stop. Without confirmation only logs a warning.
    pub fn clear_emergency_stop(&self, confirmed: bool) -> bool {
        if !confirmed {
            warn!("Risk manager emergency clear requested without confirmation, ignoring");
            return false;
        }

        let Some(reason) = self.state.lock().emergency_stop.take() else {
            return false;
        };

        warn!(reason = %reason, "Risk manager emergency stop cleared");
        self.notifier.send_async(Event::emergency_reset(EmergencyResetData {
            source: SOURCE.to_string(),
            cleared: vec![reason],
        }));
        true
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.state.lock().emergency_stop.is_some()
    }

    /// Blocks a strategy for `duration`. The block lifts itself on the first check after expiry.
    pub fn block_strategy(&self, strategy: &str, reason: &str, duration: Duration) {
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut state = self.state.lock();
        state.blocked.insert(
            strategy.to_string(),
            StrategyBlock {
                reason: reason.to_string(),
                until,
            },
        );
        let event = RiskEvent::strategy_blocked(strategy, reason, duration.as_secs());
        self.record_event(&mut state, event);

        warn!(strategy = %strategy, reason = %reason, until = %until, "Strategy blocked");
    }

    pub fn unblock_strategy(&self, strategy: &str) -> bool {
        let removed = self.state.lock().blocked.remove(strategy).is_some();
        if removed {
            info!(strategy = %strategy, "Strategy unblocked");
        }
        removed
    }

    /// Strategies with an unexpired block.
    pub fn blocked_strategies(&self) -> Vec<String> {
        let now = Utc::now();
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .blocked
            .iter()
            .filter(|(_, b)| b.until > now)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn open_positions(&self) -> BTreeMap<String, PositionRisk> {
        self.state.lock().open_positions.clone()
    }

    pub fn pnl_history(&self) -> Vec<ClosedTrade> {
        self.state.lock().pnl_history.clone()
    }

    pub fn risk_events(&self) -> Vec<RiskEvent> {
        self.state.lock().risk_events.clone()
    }

    pub fn get_risk_report(&self) -> RiskReport {
        let now = Utc::now();
        let today = now.date_naive();
        let blocked_strategies = self.blocked_strategies();
        let state = self.state.lock();

        let mut strategy_stats: BTreeMap<String, StrategyStats> = BTreeMap::new();
        for position in state.open_positions.values() {
            let stats = strategy_stats.entry(position.strategy.clone()).or_default();
            stats.positions += 1;
            stats.exposure += position.exposure();
            stats.unrealized_pnl += position.unrealized_pnl;
        }

        let daily_trades_by_strategy: BTreeMap<String, u32> = state
            .daily_trades
            .get(&today)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();

        let start = state.risk_events.len().saturating_sub(RECENT_EVENTS);

        RiskReport {
            timestamp: now,
            emergency_stop: state.emergency_stop.is_some()
                || self.emergency.as_ref().is_some_and(|e| e.is_halted()),
            blocked_strategies,
            daily_trades: daily_trades_by_strategy.values().sum(),
            daily_trades_by_strategy,
            daily_pnl: state.daily_pnl.get(&today).copied().unwrap_or(0.0),
            open_positions_count: state.open_positions.len(),
            total_exposure: state.open_positions.values().map(PositionRisk::exposure).sum(),
            total_unrealized_pnl: state.open_positions.values().map(|p| p.unrealized_pnl).sum(),
            strategy_stats,
            recent_risk_events: state.risk_events[start..].to_vec(),
            limits: self.config.global_limits.clone(),
        }
    }

    /// Aligns the open-position book with the exchange's view, matching by symbol and side.
    pub fn reconcile_positions(&self, exchange_positions: &[ExchangePosition]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut alerts = Vec::new();

        let exchange: BTreeMap<(String, Side), &ExchangePosition> = exchange_positions
            .iter()
            .filter(|p| p.is_open())
            .map(|p| ((p.symbol.clone(), p.side), p))
            .collect();

        let mut state = self.state.lock();

        for ((symbol, side), pos) in &exchange {
            let known = state
                .open_positions
                .values()
                .any(|p| &p.symbol == symbol && p.side == *side);
            if known {
                continue;
            }

            report.orphaned_positions += 1;
            warn!(
                symbol = %symbol,
                side = %side,
                size = pos.size,
                unrealized_pnl = pos.unrealized_pnl,
                "Orphaned exchange position adopted"
            );

            state.open_positions.insert(
                format!("orphaned_{}_{}", symbol, side),
                PositionRisk {
                    strategy: ORPHANED_STRATEGY.to_string(),
                    symbol: symbol.clone(),
                    side: *side,
                    size: pos.size,
                    entry_price: pos.avg_price,
                    current_price: pos.avg_price,
                    unrealized_pnl: pos.unrealized_pnl,
                    risk_pct: 0.0,
                    stop_loss: None,
                    take_profit: None,
                    opened_at: pos.created_time.unwrap_or_else(Utc::now),
                },
            );
            let event = RiskEvent::other(
                "orphaned_position",
                json!({ "symbol": symbol, "side": side, "size": pos.size }),
            );
            self.record_event(&mut state, event);
            alerts.push(RiskAlertData {
                strategy: ORPHANED_STRATEGY.to_string(),
                symbol: symbol.clone(),
                message: format!("untracked {} position of size {} adopted", side, pos.size),
                loss_pct: None,
            });
        }

        let missing: Vec<String> = state
            .open_positions
            .iter()
            .filter(|(_, p)| !exchange.contains_key(&(p.symbol.clone(), p.side)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in missing {
            state.open_positions.remove(&key);
            report.missing_positions += 1;
            warn!(key = %key, "Local position not found on exchange, dropped");
        }

        for position in state.open_positions.values_mut() {
            if let Some(pos) = exchange.get(&(position.symbol.clone(), position.side)) {
                position.size = pos.size;
                position.unrealized_pnl = pos.unrealized_pnl;
                report.synced_positions += 1;
            }
        }
        drop(state);

        for alert in alerts {
            self.notifier.send_async(Event::risk_alert(alert));
        }

        info!(
            orphaned = report.orphaned_positions,
            missing = report.missing_positions,
            synced = report.synced_positions,
            "Position reconciliation complete"
        );

        report
    }

    /// Drops daily counters and risk events older than `days`, and caps retained history.
    pub fn cleanup_old_data(&self, days: u32) {
        let now = Utc::now();
        let cutoff_date = now
            .date_naive()
            .checked_sub_days(Days::new(days as u64))
            .unwrap_or(NaiveDate::MIN);
        let cutoff = now - chrono::Duration::days(days as i64);

        let mut state = self.state.lock();
        state.daily_trades.retain(|date, _| *date >= cutoff_date);
        state.daily_pnl.retain(|date, _| *date >= cutoff_date);
        state.registered_orders.retain(|_, date| *date >= cutoff_date);
        state.risk_events.retain(|e| e.timestamp >= cutoff);
        cap(&mut state.risk_events, self.config.max_risk_events);
        cap(&mut state.pnl_history, self.config.max_pnl_history);
        self.save_audit_log(&state.risk_events);

        debug!(days, events = state.risk_events.len(), "Old risk data cleaned up");
    }

    fn record_event(&self, state: &mut State, event: RiskEvent) {
        state.risk_events.push(event);
        cap(&mut state.risk_events, self.config.max_risk_events);
        self.save_audit_log(&state.risk_events);
    }

    fn save_audit_log(&self, events: &[RiskEvent]) {
        if let Err(e) = self.persist_events(events) {
            error!(error = %e, "Failed to write risk audit log");
        }
    }

    fn persist_events(&self, events: &[RiskEvent]) -> Result<(), RiskError> {
        let Some(store) = &self.audit_log else {
            return Ok(());
        };
        store.save(&AuditLogDoc {
            version: AuditLogDoc::SCHEMA_VERSION,
            events: events.to_vec(),
        })?;
        Ok(())
    }
}

/// Time-of-day gate. Always permissive; reserved for news and weekend blackout windows.
fn is_safe_trading_time(_now: DateTime<Utc>) -> bool {
    true
}

fn cap<T>(items: &mut Vec<T>, limit: usize) {
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}
