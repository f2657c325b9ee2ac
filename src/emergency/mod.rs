//! Global kill-switch driven by a background condition monitor.
//!
//! The halt flag is sticky: once any condition triggers, trading stays halted
//! until [`EmergencyStopManager::reset_emergency_stop`] is called with
//! confirmation. There is no automatic recovery.

mod condition;
mod error;

pub use condition::{ConditionKind, EmergencyCondition};
pub use error::EmergencyError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EmergencyConfig;
use crate::exchanges::AccountData;
use crate::notification::{
    EmergencyResetData, EmergencyStopData, Event, Notifier, TriggeredCondition,
};

const SOURCE: &str = "emergency_stop_manager";

/// Snapshot returned by [`EmergencyStopManager::get_status_report`].
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyStatus {
    pub emergency_stop_active: bool,
    pub monitoring: bool,
    pub consecutive_losses: u32,
    pub consecutive_api_errors: u32,
    pub initial_equity: Option<f64>,
    pub last_check: Option<DateTime<Utc>>,
    pub conditions: Vec<EmergencyCondition>,
}

struct State {
    conditions: Vec<EmergencyCondition>,
    consecutive_losses: u32,
    consecutive_api_errors: u32,
    initial_equity: Option<f64>,
    accounts: Vec<Arc<dyn AccountData>>,
    last_check: Option<DateTime<Utc>>,
}

impl State {
    fn condition_mut(&mut self, kind: ConditionKind) -> &mut EmergencyCondition {
        &mut self.conditions[kind as usize]
    }

    fn triggered(&self) -> Vec<&EmergencyCondition> {
        self.conditions.iter().filter(|c| c.triggered).collect()
    }
}

struct Monitor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// EmergencyStopManager owns the global halt flag.
pub struct EmergencyStopManager {
    config: EmergencyConfig,
    notifier: Arc<dyn Notifier>,
    halted: AtomicBool,
    state: Mutex<State>,
    monitor: Mutex<Option<Monitor>>,
}

impl EmergencyStopManager {
    pub fn new(config: EmergencyConfig, notifier: Arc<dyn Notifier>) -> Self {
        let conditions = ConditionKind::ALL
            .iter()
            .map(|kind| {
                let threshold = match kind {
                    ConditionKind::CriticalLoss => config.critical_loss_threshold,
                    ConditionKind::MarginCall => config.margin_call_threshold,
                    ConditionKind::ConsecutiveLosses => config.consecutive_losses_limit as f64,
                    ConditionKind::ApiErrors => config.api_error_limit as f64,
                };
                EmergencyCondition::new(*kind, threshold)
            })
            .collect();

        Self {
            config,
            notifier,
            halted: AtomicBool::new(false),
            state: Mutex::new(State {
                conditions,
                consecutive_losses: 0,
                consecutive_api_errors: 0,
                initial_equity: None,
                accounts: Vec::new(),
                last_check: None,
            }),
            monitor: Mutex::new(None),
        }
    }

    /// Attaches the accounts to watch and captures the equity baseline.
    ///
    /// A baseline that cannot be fetched now is captured on the first
    /// successful evaluation instead.
    pub async fn attach_accounts(&self, accounts: Vec<Arc<dyn AccountData>>) {
        let baseline = match total_equity(&accounts).await {
            Ok(equity) => Some(equity),
            Err(e) => {
                warn!(error = %e, "Initial equity unavailable, deferring baseline");
                None
            }
        };

        let mut state = self.state.lock();
        state.accounts = accounts;
        if state.initial_equity.is_none() {
            state.initial_equity = baseline.filter(|e| *e > 0.0);
        }
        if let Some(equity) = state.initial_equity {
            info!(initial_equity = equity, "Emergency baseline captured");
        }
    }

    /// Starts the background monitor. Calling it while already running does nothing.
    pub async fn start_monitoring(self: &Arc<Self>, accounts: Vec<Arc<dyn AccountData>>) {
        if self.is_monitoring() {
            debug!("Emergency monitor already running");
            return;
        }

        self.attach_accounts(accounts).await;

        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(self).run_monitor(stop_rx));
        *monitor = Some(Monitor { stop, handle });

        info!(
            interval = ?self.config.check_interval,
            "Emergency monitor started"
        );
    }

    /// Stops the background monitor, waiting up to the configured join timeout.
    pub async fn stop_monitoring(&self) -> Result<(), EmergencyError> {
        let Some(Monitor { stop, mut handle }) = self.monitor.lock().take() else {
            return Ok(());
        };

        let _ = stop.send(true);

        match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Emergency monitor stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(EmergencyError::Monitor(e.to_string())),
            Err(_) => {
                warn!(timeout = ?self.config.join_timeout, "Emergency monitor did not stop in time, aborting");
                handle.abort();
                Ok(())
            }
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    async fn run_monitor(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                break;
            }

            let pause = match self.check_all_conditions().await {
                Ok(_) => self.config.check_interval,
                Err(e) => {
                    error!(error = %e, "Emergency condition check failed");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop.changed() => break,
            }
        }
        debug!("Emergency monitor loop exited");
    }

    /// Evaluates every condition once and returns those that are triggered.
    ///
    /// Counter conditions are always evaluated; a balance fetch failure is
    /// returned after they are committed.
    pub async fn check_all_conditions(&self) -> Result<Vec<EmergencyCondition>, EmergencyError> {
        let accounts = self.state.lock().accounts.clone();

        let equity = if accounts.is_empty() {
            None
        } else {
            Some(total_equity(&accounts).await)
        };

        let now = Utc::now();
        let (newly_triggered, triggered, first_halt) = {
            let mut state = self.state.lock();
            let mut newly = Vec::new();

            if let Some(Ok(current)) = equity {
                if state.initial_equity.is_none() && current > 0.0 {
                    state.initial_equity = Some(current);
                }
                if let Some(initial) = state.initial_equity.filter(|e| *e > 0.0) {
                    let loss = (initial - current) / initial;
                    let crossed = loss >= self.config.critical_loss_threshold;
                    if state
                        .condition_mut(ConditionKind::CriticalLoss)
                        .observe(loss, crossed, now)
                    {
                        newly.push(ConditionKind::CriticalLoss);
                    }
                }
            }

            // Placeholder: margin utilization is never computed and always reported safe.
            state
                .condition_mut(ConditionKind::MarginCall)
                .observe(0.0, false, now);

            let losses = state.consecutive_losses;
            let loss_limit = self.config.consecutive_losses_limit;
            if state.condition_mut(ConditionKind::ConsecutiveLosses).observe(
                losses as f64,
                loss_limit > 0 && losses >= loss_limit,
                now,
            ) {
                newly.push(ConditionKind::ConsecutiveLosses);
            }

            let api_errors = state.consecutive_api_errors;
            let api_limit = self.config.api_error_limit;
            if state.condition_mut(ConditionKind::ApiErrors).observe(
                api_errors as f64,
                api_limit > 0 && api_errors >= api_limit,
                now,
            ) {
                newly.push(ConditionKind::ApiErrors);
            }

            state.last_check = Some(now);

            let triggered: Vec<EmergencyCondition> =
                state.triggered().into_iter().cloned().collect();
            // Set under the state lock so a concurrent reset sees both or neither.
            let first_halt = !triggered.is_empty() && !self.halted.swap(true, Ordering::SeqCst);
            (newly, triggered, first_halt)
        };

        if first_halt {
            self.announce_halt(&triggered);
        } else if !newly_triggered.is_empty() {
            warn!(conditions = ?newly_triggered, "Additional emergency conditions triggered");
        }

        if let Some(Err(e)) = equity {
            return Err(e.into());
        }

        Ok(triggered)
    }

    fn announce_halt(&self, triggered: &[EmergencyCondition]) {
        let conditions: Vec<TriggeredCondition> = triggered
            .iter()
            .map(|c| TriggeredCondition {
                name: c.name.clone(),
                observed: c.current_value,
                threshold: c.threshold,
            })
            .collect();

        let summary: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
        error!(conditions = ?summary, "EMERGENCY STOP: trading halted");

        self.notifier.send_async(Event::emergency_stop(EmergencyStopData {
            source: SOURCE.to_string(),
            reason: "emergency conditions triggered".to_string(),
            triggered: conditions,
        }));
    }

    /// Returns whether trading is allowed and why.
    pub fn is_trading_allowed(&self) -> (bool, String) {
        if !self.halted.load(Ordering::SeqCst) {
            return (true, "trading allowed".to_string());
        }

        let names: Vec<String> = self
            .state
            .lock()
            .triggered()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        (
            false,
            format!("emergency stop active: {}", names.join(", ")),
        )
    }

    /// Lock-free read of the halt flag.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn report_trade_result(&self, is_profitable: bool) {
        let mut state = self.state.lock();
        if is_profitable {
            state.consecutive_losses = 0;
        } else {
            state.consecutive_losses = state.consecutive_losses.saturating_add(1);
            debug!(consecutive_losses = state.consecutive_losses, "Losing trade reported");
        }
    }

    pub fn report_api_error(&self) {
        let mut state = self.state.lock();
        state.consecutive_api_errors = state.consecutive_api_errors.saturating_add(1);
        debug!(consecutive_api_errors = state.consecutive_api_errors, "API error reported");
    }

    /// Decrements the API error counter by one.
    pub fn report_api_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_api_errors = state.consecutive_api_errors.saturating_sub(1);
    }

    /// Clears every condition and both counters. Without confirmation only logs a warning.
    ///
    /// Returns true when the reset was performed.
    pub fn reset_emergency_stop(&self, confirmed: bool) -> bool {
        if !confirmed {
            warn!("Emergency stop reset requested without confirmation, ignoring");
            return false;
        }

        let cleared = {
            let mut state = self.state.lock();
            let cleared: Vec<String> = state.triggered().iter().map(|c| c.name.clone()).collect();
            for condition in state.conditions.iter_mut() {
                condition.clear();
            }
            state.consecutive_losses = 0;
            state.consecutive_api_errors = 0;
            self.halted.store(false, Ordering::SeqCst);
            cleared
        };

        warn!(cleared = ?cleared, "Emergency stop reset, trading resumed");

        self.notifier.send_async(Event::emergency_reset(EmergencyResetData {
            source: SOURCE.to_string(),
            cleared,
        }));

        true
    }

    pub fn get_status_report(&self) -> EmergencyStatus {
        let monitoring = self.is_monitoring();
        let state = self.state.lock();
        EmergencyStatus {
            emergency_stop_active: self.halted.load(Ordering::SeqCst),
            monitoring,
            consecutive_losses: state.consecutive_losses,
            consecutive_api_errors: state.consecutive_api_errors,
            initial_equity: state.initial_equity,
            last_check: state.last_check,
            conditions: state.conditions.clone(),
        }
    }
}

async fn total_equity(accounts: &[Arc<dyn AccountData>]) -> crate::exchanges::Result<f64> {
    let mut total = 0.0;
    for account in accounts {
        let snapshot = crate::balance::fetch_snapshot(account.as_ref()).await?;
        total += snapshot.total_equity;
    }
    Ok(total)
}

#[cfg(test)]
mod tests;
