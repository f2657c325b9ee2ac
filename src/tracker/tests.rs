use super::*;
use crate::notification::EventType;
use crate::notification::testing::RecordingNotifier;
use crate::storage::StorageError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

struct FakeJournal {
    entries: Vec<JournalEntry>,
    reads: AtomicUsize,
}

impl FakeJournal {
    fn new(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            entries: lines.iter().filter_map(|l| JournalEntry::parse(l)).collect(),
            reads: AtomicUsize::new(0),
        })
    }
}

impl TradeJournal for FakeJournal {
    fn recent_entries(&self, limit: usize) -> Result<Vec<JournalEntry>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let start = self.entries.len().saturating_sub(limit);
        Ok(self.entries[start..].to_vec())
    }
}

struct Fixture {
    _dir: TempDir,
    config: TrackerConfig,
    notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..TrackerConfig::default()
        };
        Self {
            _dir: dir,
            config,
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn tracker(&self, journal: Arc<dyn TradeJournal>) -> PositionTracker {
        PositionTracker::new(self.config.clone(), journal, self.notifier.clone())
    }
}

fn exchange_position(
    symbol: &str,
    side: Side,
    size: f64,
    price: f64,
    created: Option<DateTime<Utc>>,
) -> ExchangePosition {
    ExchangePosition {
        symbol: symbol.to_string(),
        side,
        size,
        avg_price: price,
        unrealized_pnl: 0.0,
        created_time: created,
    }
}

// ==================== Keys and tracking ====================

#[test]
fn test_position_key_format() {
    assert_eq!(
        position_key("BTCUSDT", Side::Buy, 43000.7, 0.5),
        "BTCUSDT_Buy_43000_500000"
    );
    assert_eq!(
        position_key("ETHUSDT", Side::Sell, 2500.0, 1.25),
        "ETHUSDT_Sell_2500_1250000"
    );
}

#[test]
fn test_track_system_position() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));

    let key = tracker.track_system_position(
        "BTCUSDT",
        Side::Buy,
        0.5,
        43000.0,
        "breakout",
        Some("ord-1".to_string()),
    );

    let pos = tracker.get_position(&key).unwrap();
    assert_eq!(pos.origin, PositionOrigin::System);
    assert_eq!(pos.strategy.as_deref(), Some("breakout"));
    assert_eq!(pos.order_id.as_deref(), Some("ord-1"));
    assert_eq!(tracker.history()[0].action, HistoryAction::Opened);
}

// ==================== Classification ====================

#[test]
fn test_position_older_than_startup_is_inherited() {
    let fx = Fixture::new();
    let now = Utc::now();
    let tracker = fx.tracker(FakeJournal::new(&[])).with_startup_time(now);

    let positions = [exchange_position(
        "BTCUSDT",
        Side::Buy,
        0.5,
        43000.0,
        Some(now - ChronoDuration::hours(1)),
    )];
    let classified = tracker.scan_at(&positions, now);

    let c = classified.values().next().unwrap();
    assert_eq!(c.origin, PositionOrigin::Inherited);
    assert!(c.comment.starts_with("Inherited from before system startup"));
    assert!(c.newly_discovered);
    assert_eq!(c.risk_level, RiskLevel::Low);
}

#[test]
fn test_stale_position_is_external() {
    let fx = Fixture::new();
    let now = Utc::now();
    let tracker = fx
        .tracker(FakeJournal::new(&["t,s,BUY,43000"]))
        .with_startup_time(now - ChronoDuration::days(30));

    let positions = [exchange_position(
        "BTCUSDT",
        Side::Buy,
        0.5,
        43000.0,
        Some(now - ChronoDuration::days(10)),
    )];
    let c = tracker.scan_at(&positions, now).into_values().next().unwrap();

    assert_eq!(c.origin, PositionOrigin::External);
    assert_eq!(c.risk_level, RiskLevel::High);
    assert!(c.age_days > 9.9);
}

#[test]
fn test_journal_match_is_system() {
    let fx = Fixture::new();
    let now = Utc::now();
    let journal = FakeJournal::new(&[
        "timestamp,strategy,signal,entry_price",
        "2026-01-01T00:00:00Z,breakout,STRONG_BUY,43005",
    ]);
    let tracker = fx
        .tracker(journal.clone())
        .with_startup_time(now - ChronoDuration::hours(1));
    let created = Some(now - ChronoDuration::minutes(10));

    let positions = [
        exchange_position("BTCUSDT", Side::Buy, 0.5, 43000.0, created),
        exchange_position("BTCUSDT", Side::Sell, 0.5, 43000.0, created),
    ];
    let classified = tracker.scan_at(&positions, now);

    let buy = &classified["BTCUSDT_Buy_43000_500000"];
    let sell = &classified["BTCUSDT_Sell_43000_500000"];
    assert_eq!(buy.origin, PositionOrigin::System);
    assert!(buy.is_system);
    assert_eq!(buy.risk_level, RiskLevel::Low);
    assert_eq!(sell.origin, PositionOrigin::External);
    // the journal is read at most once per scan
    assert_eq!(journal.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_price_tolerance_is_strict() {
    let fx = Fixture::new();
    let now = Utc::now();
    let tracker = fx
        .tracker(FakeJournal::new(&["t,s,BUY,43010"]))
        .with_startup_time(now);

    let positions = [exchange_position("BTCUSDT", Side::Buy, 0.5, 43000.0, None)];
    let c = tracker.scan_at(&positions, now).into_values().next().unwrap();

    assert_eq!(c.origin, PositionOrigin::External);
}

#[test]
fn test_zero_size_positions_ignored() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));

    let positions = [exchange_position("BTCUSDT", Side::Buy, 0.0, 43000.0, None)];
    let classified = tracker.scan_and_classify_positions(&positions);

    assert!(classified.is_empty());
    assert_eq!(tracker.get_stats().active_positions, 0);
}

#[test]
fn test_tracked_position_not_reclassified() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));
    let key = tracker.track_system_position("ETHUSDT", Side::Sell, 2.0, 2500.0, "mean_revert", None);

    let positions = [exchange_position("ETHUSDT", Side::Sell, 2.0, 2500.0, None)];
    for _ in 0..3 {
        let classified = tracker.scan_and_classify_positions(&positions);
        let c = &classified[&key];
        assert_eq!(c.origin, PositionOrigin::System);
        assert_eq!(c.strategy.as_deref(), Some("mean_revert"));
        assert!(!c.newly_discovered);
    }

    assert_eq!(tracker.history().len(), 1);
    assert_eq!(fx.notifier.count(EventType::PositionDiscovered), 0);
}

#[test]
fn test_classification_is_deterministic() {
    let now = Utc::now();
    let startup = now - ChronoDuration::hours(2);
    let positions = [
        exchange_position("BTCUSDT", Side::Buy, 0.5, 43000.0, Some(now - ChronoDuration::minutes(30))),
        exchange_position("ETHUSDT", Side::Sell, 1.0, 2500.0, Some(now - ChronoDuration::days(3))),
        exchange_position("SOLUSDT", Side::Buy, 3.0, 150.0, None),
    ];
    let lines = ["t,s,BUY,42995", "t,s,SELL,9999"];

    let origins = || {
        let fx = Fixture::new();
        let tracker = fx.tracker(FakeJournal::new(&lines)).with_startup_time(startup);
        tracker
            .scan_at(&positions, now)
            .into_iter()
            .map(|(k, c)| (k, c.origin))
            .collect::<Vec<_>>()
    };

    let first = origins();
    for _ in 0..5 {
        assert_eq!(origins(), first);
    }
}

#[test]
fn test_discovery_emits_notification_and_history() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));

    let positions = [exchange_position("XRPUSDT", Side::Buy, 100.0, 0.6, None)];
    tracker.scan_and_classify_positions(&positions);

    assert_eq!(fx.notifier.count(EventType::PositionDiscovered), 1);
    let history = tracker.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Discovered);
}

#[test]
fn test_concurrent_scans_discover_each_key_once() {
    let fx = Fixture::new();
    let tracker = Arc::new(fx.tracker(FakeJournal::new(&[])));
    let positions = [
        exchange_position("BTCUSDT", Side::Buy, 0.5, 43000.0, None),
        exchange_position("XRPUSDT", Side::Sell, 100.0, 0.6, None),
    ];
    let shared_key = position_key("BTCUSDT", Side::Buy, 43000.0, 0.5);
    let scanned_only = position_key("XRPUSDT", Side::Sell, 0.6, 100.0);

    let positions = &positions;
    std::thread::scope(|s| {
        for _ in 0..6 {
            let tracker = tracker.clone();
            s.spawn(move || {
                for _ in 0..20 {
                    tracker.scan_and_classify_positions(positions);
                }
            });
        }
        let tracker = tracker.clone();
        s.spawn(move || {
            tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);
            for i in 0..20 {
                let key = tracker.track_system_position("SOLUSDT", Side::Buy, 3.0, 150.0, "scalper", None);
                assert!(tracker.close_position(&key, 150.0 + i as f64, "cycle").is_some());
            }
        });
    });

    let history = tracker.history();
    let discovered = |key: &str| {
        history
            .iter()
            .filter(|r| r.key == key && r.action == HistoryAction::Discovered)
            .count()
    };
    assert_eq!(discovered(&scanned_only), 1);
    assert!(discovered(&shared_key) <= 1);
    assert_eq!(
        fx.notifier.count(EventType::PositionDiscovered),
        discovered(&scanned_only) + discovered(&shared_key)
    );

    let closed = history
        .iter()
        .filter(|r| r.action == HistoryAction::Closed)
        .count();
    assert_eq!(closed, 20);

    let live = tracker.positions();
    assert_eq!(live.len(), 2);
    assert!(live.contains_key(&shared_key));
    assert!(live.contains_key(&scanned_only));
}

// ==================== Close and persistence ====================

#[test]
fn test_close_position_moves_to_history() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));
    let key = tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);

    let closed = tracker.close_position(&key, 44000.0, "take profit").unwrap();

    assert_eq!(closed.symbol, "BTCUSDT");
    assert!(tracker.get_position(&key).is_none());
    let last = tracker.history().pop().unwrap();
    assert_eq!(last.action, HistoryAction::Closed);
    assert_eq!(last.exit_price, Some(44000.0));
    assert_eq!(last.reason.as_deref(), Some("take profit"));

    assert!(tracker.close_position(&key, 44000.0, "again").is_none());
}

#[test]
fn test_state_survives_restart() {
    let fx = Fixture::new();
    let now = Utc::now();
    let before = {
        let tracker = fx.tracker(FakeJournal::new(&[]));
        tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);
        tracker.track_system_position("ETHUSDT", Side::Sell, 2.0, 2500.0, "scalper", None);
        let closed = tracker.track_system_position("SOLUSDT", Side::Buy, 3.0, 150.0, "scalper", None);
        tracker.close_position(&closed, 151.0, "manual");
        tracker.scan_at(
            &[exchange_position("XRPUSDT", Side::Buy, 100.0, 0.6, Some(now))],
            now,
        );
        tracker.positions()
    };

    let reloaded = fx.tracker(FakeJournal::new(&[]));
    let after = reloaded.positions();

    assert_eq!(after.len(), 3);
    for (key, pos) in &before {
        let restored = &after[key];
        assert_eq!(restored.origin, pos.origin);
        assert_eq!(restored.strategy, pos.strategy);
    }
    assert_eq!(reloaded.history().len(), 5);
}

#[test]
fn test_corrupt_store_starts_empty() {
    let fx = Fixture::new();
    let dir = Path::new(&fx.config.data_dir);
    std::fs::write(dir.join(POSITIONS_FILE), "{\"version\": 1, \"positions\": [").unwrap();
    std::fs::write(dir.join(HISTORY_FILE), "{\"version\": 99, \"records\": []}").unwrap();

    let tracker = fx.tracker(FakeJournal::new(&[]));

    assert!(tracker.positions().is_empty());
    assert!(tracker.history().is_empty());

    // the next mutation overwrites the bad files
    tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);
    assert_eq!(fx.tracker(FakeJournal::new(&[])).positions().len(), 1);
}

#[test]
fn test_history_is_capped() {
    let mut fx = Fixture::new();
    fx.config.history_limit = 3;
    let tracker = fx.tracker(FakeJournal::new(&[]));

    for i in 0..5 {
        tracker.track_system_position("BTCUSDT", Side::Buy, 0.1, 40000.0 + i as f64, "s", None);
    }

    let history = tracker.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].position.entry_price, 40002.0);
}

// ==================== Aggregates ====================

#[test]
fn test_neural_data_insights() {
    let fx = Fixture::new();
    let now = Utc::now();
    let tracker = fx.tracker(FakeJournal::new(&[])).with_startup_time(now);
    tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);
    tracker.scan_at(
        &[
            exchange_position("ETHUSDT", Side::Sell, 1.0, 2500.0, None),
            exchange_position("SOLUSDT", Side::Buy, 3.0, 150.0, None),
        ],
        now,
    );

    let data = tracker.get_neural_data();

    assert_eq!(
        data.positions_summary,
        PositionsSummary {
            total: 3,
            system: 1,
            external: 2,
            inherited: 0,
            unknown: 0,
        }
    );
    assert!((data.insights.external_position_ratio - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(data.insights.most_common_origin, PositionOrigin::External);
    assert_eq!(data.insights.risk_indicators, vec!["external_positions_detected"]);
    assert_eq!(data.positions.len(), 3);
}

#[test]
fn test_neural_data_empty() {
    let fx = Fixture::new();
    let data = fx.tracker(FakeJournal::new(&[])).get_neural_data();

    assert_eq!(data.positions_summary.total, 0);
    assert_eq!(data.insights.most_common_origin, PositionOrigin::Unknown);
    assert!(data.insights.risk_indicators.is_empty());
}

#[test]
fn test_stats_breakdown_lists_every_origin() {
    let fx = Fixture::new();
    let tracker = fx.tracker(FakeJournal::new(&[]));
    tracker.track_system_position("BTCUSDT", Side::Buy, 0.5, 43000.0, "breakout", None);
    tracker.scan_and_classify_positions(&[]);

    let stats = tracker.get_stats();

    assert_eq!(stats.active_positions, 1);
    assert_eq!(stats.origins_breakdown.len(), 4);
    assert_eq!(stats.origins_breakdown[&PositionOrigin::System], 1);
    assert_eq!(stats.origins_breakdown[&PositionOrigin::Inherited], 0);
    assert!(stats.last_scan.is_some());

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["origins_breakdown"]["system"], 1);
}
