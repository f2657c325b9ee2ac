use super::*;
use crate::domain::BalanceSnapshot;
use crate::exchanges::{self, ExchangeError};
use crate::notification::EventType;
use crate::notification::testing::RecordingNotifier;
use async_trait::async_trait;
use std::time::Duration;

/// Account whose equity can be changed from the test.
struct ScriptedAccount {
    equity: Mutex<Option<f64>>,
}

impl ScriptedAccount {
    fn new(equity: f64) -> Arc<Self> {
        Arc::new(Self {
            equity: Mutex::new(Some(equity)),
        })
    }

    fn set(&self, equity: Option<f64>) {
        *self.equity.lock() = equity;
    }
}

#[async_trait]
impl AccountData for ScriptedAccount {
    async fn get_wallet_balance(&self) -> exchanges::Result<BalanceSnapshot> {
        let equity = (*self.equity.lock())
            .ok_or_else(|| ExchangeError::Connection("unreachable".to_string()))?;
        Ok(BalanceSnapshot {
            available_balance: equity,
            used_margin: 0.0,
            total_equity: equity,
            reserve_balance: equity,
            initial_equity: None,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn manager() -> (Arc<EmergencyStopManager>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let manager = Arc::new(EmergencyStopManager::new(
        EmergencyConfig::default(),
        notifier.clone(),
    ));
    (manager, notifier)
}

#[tokio::test]
async fn test_fresh_manager_allows_trading() {
    let (manager, _) = manager();

    let triggered = manager.check_all_conditions().await.unwrap();

    assert!(triggered.is_empty());
    assert_eq!(manager.is_trading_allowed(), (true, "trading allowed".to_string()));
}

#[tokio::test]
async fn test_seven_losses_halt_on_next_evaluation() {
    let (manager, notifier) = manager();

    for _ in 0..7 {
        manager.report_trade_result(false);
    }
    // the counter alone does not halt until evaluated
    assert!(manager.is_trading_allowed().0);

    let triggered = manager.check_all_conditions().await.unwrap();

    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].kind, ConditionKind::ConsecutiveLosses);
    let (allowed, reason) = manager.is_trading_allowed();
    assert!(!allowed);
    assert!(reason.contains("consecutive_losses"));
    assert_eq!(notifier.count(EventType::EmergencyStop), 1);

    let event = &notifier.events()[0];
    assert_eq!(event.triggered_conditions().len(), 1);
}

#[tokio::test]
async fn test_profitable_trade_resets_loss_streak() {
    let (manager, notifier) = manager();

    for _ in 0..6 {
        manager.report_trade_result(false);
    }
    manager.report_trade_result(true);
    manager.report_trade_result(false);

    manager.check_all_conditions().await.unwrap();

    assert!(manager.is_trading_allowed().0);
    assert_eq!(manager.get_status_report().consecutive_losses, 1);
    assert_eq!(notifier.count(EventType::EmergencyStop), 0);
}

#[tokio::test]
async fn test_halt_is_sticky_until_confirmed_reset() {
    let (manager, notifier) = manager();

    for _ in 0..10 {
        manager.report_api_error();
    }
    manager.check_all_conditions().await.unwrap();
    assert!(!manager.is_trading_allowed().0);

    // recovery of the counter does not clear the halt
    for _ in 0..10 {
        manager.report_api_success();
    }
    for _ in 0..3 {
        manager.check_all_conditions().await.unwrap();
        assert!(!manager.is_trading_allowed().0);
    }

    // unconfirmed reset is a no-op, repeatedly
    assert!(!manager.reset_emergency_stop(false));
    assert!(!manager.reset_emergency_stop(false));
    assert!(!manager.is_trading_allowed().0);
    assert!(manager.is_halted());

    assert!(manager.reset_emergency_stop(true));
    assert!(manager.is_trading_allowed().0);
    assert_eq!(notifier.count(EventType::EmergencyStop), 1);
    assert_eq!(notifier.count(EventType::EmergencyReset), 1);

    let status = manager.get_status_report();
    assert!(status.conditions.iter().all(|c| !c.triggered && c.trigger_time.is_none()));
    assert_eq!(status.consecutive_api_errors, 0);
}

#[tokio::test]
async fn test_api_success_floors_at_zero() {
    let (manager, _) = manager();

    manager.report_api_error();
    manager.report_api_success();
    manager.report_api_success();

    assert_eq!(manager.get_status_report().consecutive_api_errors, 0);
}

#[tokio::test]
async fn test_critical_loss_against_captured_baseline() {
    let (manager, notifier) = manager();
    let account = ScriptedAccount::new(10_000.0);

    manager.attach_accounts(vec![account.clone()]).await;
    assert_eq!(manager.get_status_report().initial_equity, Some(10_000.0));

    account.set(Some(9_500.0));
    assert!(manager.check_all_conditions().await.unwrap().is_empty());

    account.set(Some(9_100.0));
    let triggered = manager.check_all_conditions().await.unwrap();

    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].kind, ConditionKind::CriticalLoss);
    assert!((triggered[0].current_value - 0.09).abs() < 1e-9);
    assert!(manager.is_halted());

    // equity recovery does not lift the halt
    account.set(Some(12_000.0));
    manager.check_all_conditions().await.unwrap();
    assert!(manager.is_halted());
    assert_eq!(notifier.count(EventType::EmergencyStop), 1);
}

#[tokio::test]
async fn test_balance_failure_reported_after_counters() {
    let (manager, _) = manager();
    let account = ScriptedAccount::new(10_000.0);
    manager.attach_accounts(vec![account.clone()]).await;

    for _ in 0..7 {
        manager.report_trade_result(false);
    }
    account.set(None);

    let result = manager.check_all_conditions().await;

    assert!(matches!(result, Err(EmergencyError::Balance(_))));
    assert!(manager.is_halted());
}

#[tokio::test]
async fn test_margin_call_never_triggers() {
    let (manager, _) = manager();

    manager.check_all_conditions().await.unwrap();

    let status = manager.get_status_report();
    let margin = status
        .conditions
        .iter()
        .find(|c| c.kind == ConditionKind::MarginCall)
        .unwrap();
    assert!(!margin.triggered);
    assert_eq!(margin.name, "margin_call");
    assert_eq!(status.conditions.len(), 4);
}

#[tokio::test]
async fn test_monitor_lifecycle_is_idempotent() {
    let notifier = Arc::new(RecordingNotifier::new());
    let config = EmergencyConfig {
        check_interval: Duration::from_millis(20),
        ..EmergencyConfig::default()
    };
    let manager = Arc::new(EmergencyStopManager::new(config, notifier.clone()));
    let account = ScriptedAccount::new(10_000.0);

    manager.start_monitoring(vec![account.clone()]).await;
    manager.start_monitoring(vec![account.clone()]).await;
    assert!(manager.is_monitoring());

    for _ in 0..7 {
        manager.report_trade_result(false);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_trading_allowed().0);
    assert!(manager.get_status_report().last_check.is_some());

    manager.stop_monitoring().await.unwrap();
    manager.stop_monitoring().await.unwrap();
    assert!(!manager.is_monitoring());
    assert_eq!(notifier.count(EventType::EmergencyStop), 1);
}

#[tokio::test]
async fn test_monitor_survives_failed_evaluations() {
    let config = EmergencyConfig {
        check_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        ..EmergencyConfig::default()
    };
    let manager = Arc::new(EmergencyStopManager::new(
        config,
        Arc::new(RecordingNotifier::new()),
    ));
    let account = ScriptedAccount::new(10_000.0);

    manager.start_monitoring(vec![account.clone()]).await;
    account.set(None);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(manager.is_monitoring());

    account.set(Some(5_000.0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.is_halted());

    manager.stop_monitoring().await.unwrap();
}

// ==================== Concurrency ====================

#[test]
fn test_counters_are_exact_under_contention() {
    let (manager, _) = manager();
    let threads = 8;
    let iterations = 250;

    std::thread::scope(|s| {
        for _ in 0..threads {
            let manager = manager.clone();
            s.spawn(move || {
                for _ in 0..iterations {
                    manager.report_trade_result(false);
                    manager.report_api_error();
                }
            });
        }
    });

    let status = manager.get_status_report();
    assert_eq!(status.consecutive_losses, threads * iterations);
    assert_eq!(status.consecutive_api_errors, threads * iterations);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_racing_checks_leaves_consistent_state() {
    let (manager, _) = manager();

    for _ in 0..50 {
        for _ in 0..10 {
            manager.report_api_error();
        }

        let checker = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.check_all_conditions().await })
        };
        let resetter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reset_emergency_stop(true) })
        };
        checker.await.unwrap().unwrap();
        assert!(resetter.await.unwrap());

        let status = manager.get_status_report();
        let any_triggered = status.conditions.iter().any(|c| c.triggered);
        assert_eq!(status.emergency_stop_active, any_triggered);
    }
}
