//! Tests for notification formatting functions.

use super::*;
use std::sync::Arc;
use std::time::Duration;

// ==================== Helper function tests ====================

#[test]
fn test_escape_markdown_symbol() {
    assert_eq!(escape_markdown("BTC_USDT"), "BTC\\_USDT");
}

#[test]
fn test_escape_markdown_plain() {
    assert_eq!(escape_markdown("BTCUSDT"), "BTCUSDT");
}

#[test]
fn test_format_duration_seconds() {
    assert_eq!(format_duration(Duration::from_secs(45)), "45с");
}

#[test]
fn test_format_duration_minutes() {
    assert_eq!(format_duration(Duration::from_secs(125)), "2м 5с");
}

#[test]
fn test_format_duration_hours() {
    assert_eq!(format_duration(Duration::from_secs(3725)), "1ч 2м");
}

#[test]
fn test_format_duration_days() {
    assert_eq!(format_duration(Duration::from_secs(90000)), "1д 1ч");
}

// ==================== Event formatting tests ====================

fn sample_conditions() -> Vec<TriggeredCondition> {
    vec![
        TriggeredCondition {
            name: "consecutive_losses".to_string(),
            observed: 7.0,
            threshold: 7.0,
        },
        TriggeredCondition {
            name: "api_errors".to_string(),
            observed: 12.0,
            threshold: 10.0,
        },
    ]
}

#[test]
fn test_format_emergency_stop_lists_every_condition() {
    let data = EmergencyStopData {
        source: "emergency_stop_manager".to_string(),
        reason: "conditions triggered".to_string(),
        triggered: sample_conditions(),
    };

    let msg = format_emergency_stop(&data);

    assert!(msg.contains("ЭКСТРЕННАЯ ОСТАНОВКА"));
    assert!(msg.contains("consecutive_losses: 7"));
    assert!(msg.contains("api_errors: 12"));
}

#[test]
fn test_format_emergency_stop_without_conditions() {
    let data = EmergencyStopData {
        source: "risk_manager".to_string(),
        reason: "manual halt".to_string(),
        triggered: Vec::new(),
    };

    let msg = format_emergency_stop(&data);

    assert!(msg.contains("manual halt"));
    assert!(!msg.contains("Условия"));
}

#[test]
fn test_format_order_blocked() {
    let data = BlockData {
        category: BlockCategory::PositionLimit,
        symbol: "ETH_USDT".to_string(),
        strategy: "breakout".to_string(),
        reason: "open position limit reached (1)".to_string(),
    };

    let msg = format_order_blocked(&data);

    assert!(msg.contains("position_limit"));
    assert!(msg.contains("breakout"));
    assert!(msg.contains("#ETH\\_USDT"));
}

#[test]
fn test_format_risk_alert_with_loss() {
    let data = RiskAlertData {
        strategy: "scalper".to_string(),
        symbol: "BTCUSDT".to_string(),
        message: "unrealized loss above 2% of balance".to_string(),
        loss_pct: Some(-2.5),
    };

    let msg = format_risk_alert(&data);

    assert!(msg.contains("scalper"));
    assert!(msg.contains("-2.50%"));
}

#[test]
fn test_format_shutdown() {
    let data = ShutdownData {
        reason: "operator request".to_string(),
        uptime: Duration::from_secs(3600),
    };

    let msg = format_shutdown(&data);

    assert!(msg.contains("operator request"));
    assert!(msg.contains("1ч 0м"));
}

// ==================== Event constructor tests ====================

#[test]
fn test_event_emergency_stop_is_critical() {
    let event = Event::emergency_stop(EmergencyStopData {
        source: "emergency_stop_manager".to_string(),
        reason: "conditions triggered".to_string(),
        triggered: sample_conditions(),
    });

    assert_eq!(event.event_type, EventType::EmergencyStop);
    assert_eq!(event.severity, Severity::Critical);
    assert_eq!(event.triggered_conditions().len(), 2);
    assert!(event.body().contains(event.title()));
}

#[test]
fn test_event_order_blocked_severity() {
    let blocked = |category| {
        Event::order_blocked(BlockData {
            category,
            symbol: "BTCUSDT".to_string(),
            strategy: "s".to_string(),
            reason: "r".to_string(),
        })
    };

    assert_eq!(blocked(BlockCategory::EmergencyStop).severity, Severity::Critical);
    assert_eq!(blocked(BlockCategory::RiskLimit).severity, Severity::Warning);
    assert!(blocked(BlockCategory::RiskLimit).triggered_conditions().is_empty());
}

#[test]
fn test_event_type_display() {
    assert_eq!(EventType::EmergencyStop.to_string(), "emergency_stop");
    assert_eq!(EventType::EmergencyReset.to_string(), "emergency_reset");
    assert_eq!(EventType::OrderBlocked.to_string(), "order_blocked");
    assert_eq!(EventType::RiskAlert.to_string(), "risk_alert");
    assert_eq!(EventType::PositionDiscovered.to_string(), "position_discovered");
    assert_eq!(EventType::Startup.to_string(), "startup");
    assert_eq!(EventType::Shutdown.to_string(), "shutdown");
}

#[tokio::test]
async fn test_multi_notifier_skips_disabled() {
    let multi = MultiNotifier::new(vec![Arc::new(NoopNotifier::new())]);

    assert!(!multi.is_enabled(EventType::EmergencyStop));
    assert!(
        multi
            .send(&Event::shutdown(ShutdownData {
                reason: "test".to_string(),
                uptime: Duration::ZERO,
            }))
            .await
            .is_ok()
    );
}
