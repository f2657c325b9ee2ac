//! Control plane wiring.
//!
//! Builds the balance validator, emergency stop manager, position tracker
//! and risk manager from one [`Config`], connects them, and owns the
//! emergency monitor lifecycle.

mod error;

pub use error::PlaneError;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::balance::BalanceValidator;
use crate::config::Config;
use crate::domain::ExchangePosition;
use crate::emergency::EmergencyStopManager;
use crate::exchanges::{AccountData, PriceFeed};
use crate::notification::{
    Event, MultiNotifier, NoopNotifier, Notifier, ShutdownData, StartupData, TelegramConfig,
    TelegramNotifier,
};
use crate::risk::{ReconcileReport, RiskManager};
use crate::tracker::{Classification, PositionTracker};

/// ControlPlane holds the four safety services for one trading process.
pub struct ControlPlane {
    app_name: String,
    retention_days: u32,
    notifier: Arc<dyn Notifier>,
    balance: Arc<BalanceValidator>,
    emergency: Arc<EmergencyStopManager>,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskManager>,
    started_at: Mutex<Option<Instant>>,
}

impl ControlPlane {
    /// Builds every service from `config`, with Telegram delivery when it is enabled.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, build_notifier(config), None)
    }

    /// Like [`ControlPlane::from_config`], pricing balance checks from `prices`.
    pub fn from_config_with_price_feed(config: &Config, prices: Arc<dyn PriceFeed>) -> Self {
        Self::new(config, build_notifier(config), Some(prices))
    }

    /// Builds every service from `config`, delivering events to `notifier`.
    pub fn with_notifier(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(config, notifier, None)
    }

    /// Builds every service. Without `prices` the balance validator uses its fallback price.
    pub fn new(
        config: &Config,
        notifier: Arc<dyn Notifier>,
        prices: Option<Arc<dyn PriceFeed>>,
    ) -> Self {
        let risk_config = config.risk();
        let retention_days = risk_config.event_retention_days;

        let mut validator = BalanceValidator::new(config.balance());
        if let Some(prices) = prices {
            validator = validator.with_price_feed(prices);
        }
        let balance = Arc::new(validator);
        let emergency = Arc::new(EmergencyStopManager::new(
            config.emergency(),
            notifier.clone(),
        ));
        let tracker = Arc::new(PositionTracker::from_config(
            config.tracker(),
            notifier.clone(),
        ));
        let risk = Arc::new(
            RiskManager::new(risk_config, notifier.clone())
                .with_emergency_stop(emergency.clone())
                .with_balance_validator(balance.clone()),
        );

        info!(app = %config.app.name, env = %config.app.env, "Control plane assembled");

        Self {
            app_name: config.app.name.clone(),
            retention_days,
            notifier,
            balance,
            emergency,
            tracker,
            risk,
            started_at: Mutex::new(None),
        }
    }

    /// Announces startup and begins emergency monitoring of `accounts`.
    pub async fn start(&self, accounts: Vec<Arc<dyn AccountData>>) -> Result<(), PlaneError> {
        {
            let mut started_at = self.started_at.lock();
            if started_at.is_some() {
                return Err(PlaneError::AlreadyRunning);
            }
            *started_at = Some(Instant::now());
        }

        let names: Vec<String> = accounts.iter().map(|a| a.name().to_string()).collect();
        info!(accounts = ?names, "Starting control plane");

        self.send_notification(Event::startup(StartupData {
            app_name: self.app_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            accounts: names,
        }))
        .await;

        self.emergency.start_monitoring(accounts).await;
        Ok(())
    }

    /// Stops monitoring, prunes old risk data and flushes notifications.
    pub async fn stop(&self, reason: &str) -> Result<(), PlaneError> {
        let Some(started_at) = self.started_at.lock().take() else {
            return Ok(());
        };
        let uptime = started_at.elapsed();

        info!(reason = %reason, "Stopping control plane");

        let monitor = self.emergency.stop_monitoring().await;
        self.risk.cleanup_old_data(self.retention_days);

        self.send_notification(Event::shutdown(ShutdownData {
            reason: reason.to_string(),
            uptime,
        }))
        .await;

        if let Err(e) = self.notifier.close().await {
            warn!(error = %e, "Failed to close notifier");
        }

        info!(uptime = ?uptime, "Control plane stopped");

        monitor.map_err(PlaneError::from)
    }

    pub fn is_running(&self) -> bool {
        self.started_at.lock().is_some()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Classifies an exchange snapshot in the tracker and reconciles the risk book with it.
    pub fn sync_positions(
        &self,
        positions: &[ExchangePosition],
    ) -> (BTreeMap<String, Classification>, ReconcileReport) {
        let classifications = self.tracker.scan_and_classify_positions(positions);
        let report = self.risk.reconcile_positions(positions);
        (classifications, report)
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn balance(&self) -> &Arc<BalanceValidator> {
        &self.balance
    }

    pub fn emergency(&self) -> &Arc<EmergencyStopManager> {
        &self.emergency
    }

    pub fn tracker(&self) -> &Arc<PositionTracker> {
        &self.tracker
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    async fn send_notification(&self, event: Event) {
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(telegram) = config
        .notification
        .as_ref()
        .and_then(|n| n.telegram.as_ref())
        .filter(|t| t.enabled && !t.bot_token.is_empty() && !t.chat_id.is_empty())
    {
        match TelegramNotifier::new(TelegramConfig::from_settings(telegram)) {
            Ok(notifier) => {
                notifiers.push(Arc::new(notifier));
                info!("Telegram notifier created");
            }
            Err(e) => warn!(error = %e, "Failed to create Telegram notifier"),
        }
    }

    if notifiers.is_empty() {
        return Arc::new(NoopNotifier::new());
    }
    Arc::new(MultiNotifier::new(notifiers))
}
