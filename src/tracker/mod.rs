//! Durable inventory of exchange positions and their provenance.
//!
//! Every scan compares the exchange position feed against the tracked map;
//! positions the tracker has never seen are classified by origin and added.
//! Scans and point writes run under one lock so a position is never
//! classified twice.

mod position;

pub use position::{
    Classification, HistoryAction, PositionOrigin, PositionRecord, RiskLevel, TrackedPosition,
    position_key,
};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::TrackerConfig;
use crate::domain::{ExchangePosition, Side};
use crate::notification::{Event, Notifier, PositionDiscoveredData};
use crate::storage::{CsvTradeJournal, JournalEntry, JsonFileStore, TradeJournal, Versioned};

use position::{PositionHistoryDoc, TrackedPositionsDoc, age_days};

const POSITIONS_FILE: &str = "tracked_positions.json";
const HISTORY_FILE: &str = "position_history.json";

/// Live counts returned by [`PositionTracker::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStats {
    pub active_positions: usize,
    pub total_history: usize,
    pub origins_breakdown: BTreeMap<PositionOrigin, usize>,
    pub system_startup: DateTime<Utc>,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Aggregate view consumed by the strategy-scoring collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct NeuralData {
    pub timestamp: DateTime<Utc>,
    pub system_startup: DateTime<Utc>,
    pub positions_summary: PositionsSummary,
    pub positions: Vec<NeuralPosition>,
    pub insights: Insights,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionsSummary {
    pub total: usize,
    pub system: usize,
    pub external: usize,
    pub inherited: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeuralPosition {
    pub key: String,
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub origin: PositionOrigin,
    pub strategy: Option<String>,
    pub age_hours: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub external_position_ratio: f64,
    pub avg_position_age_days: f64,
    pub most_common_origin: PositionOrigin,
    pub risk_indicators: Vec<String>,
}

struct State {
    positions: BTreeMap<String, TrackedPosition>,
    history: Vec<PositionRecord>,
    last_scan: Option<DateTime<Utc>>,
}

/// PositionTracker owns the tracked-position map and its history.
pub struct PositionTracker {
    config: TrackerConfig,
    journal: Arc<dyn TradeJournal>,
    notifier: Arc<dyn Notifier>,
    startup_time: DateTime<Utc>,
    positions_store: JsonFileStore<TrackedPositionsDoc>,
    history_store: JsonFileStore<PositionHistoryDoc>,
    state: Mutex<State>,
}

impl PositionTracker {
    /// Creates a tracker and reloads any persisted state from `config.data_dir`.
    pub fn new(
        config: TrackerConfig,
        journal: Arc<dyn TradeJournal>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let dir = Path::new(&config.data_dir);
        let positions_store = JsonFileStore::<TrackedPositionsDoc>::new(dir.join(POSITIONS_FILE));
        let history_store = JsonFileStore::<PositionHistoryDoc>::new(dir.join(HISTORY_FILE));

        let positions = positions_store
            .load_or_empty()
            .map(|doc| doc.positions)
            .unwrap_or_default();
        let mut history = history_store
            .load_or_empty()
            .map(|doc| doc.records)
            .unwrap_or_default();
        cap_history(&mut history, config.history_limit);

        info!(
            data_dir = %config.data_dir,
            positions = positions.len(),
            history = history.len(),
            "Position tracker loaded"
        );

        Self {
            config,
            journal,
            notifier,
            startup_time: Utc::now(),
            positions_store,
            history_store,
            state: Mutex::new(State {
                positions,
                history,
                last_scan: None,
            }),
        }
    }

    /// Creates a tracker reading the CSV trade journal from `config.data_dir`.
    pub fn from_config(config: TrackerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let journal_path = Path::new(&config.data_dir).join(&config.journal_file);
        let journal = Arc::new(CsvTradeJournal::new(journal_path));
        Self::new(config, journal, notifier)
    }

    /// Overrides the process startup time used by inherited-position detection.
    pub fn with_startup_time(mut self, startup_time: DateTime<Utc>) -> Self {
        self.startup_time = startup_time;
        self
    }

    pub fn startup_time(&self) -> DateTime<Utc> {
        self.startup_time
    }

    /// Records a position the trading loop just opened and returns its key.
    pub fn track_system_position(
        &self,
        symbol: &str,
        side: Side,
        size: f64,
        entry_price: f64,
        strategy: &str,
        order_id: Option<String>,
    ) -> String {
        let now = Utc::now();
        let key = position_key(symbol, side, entry_price, size);
        let position = TrackedPosition {
            symbol: symbol.to_string(),
            side,
            size,
            entry_price,
            origin: PositionOrigin::System,
            strategy: Some(strategy.to_string()),
            created_time: now,
            exchange_created_time: None,
            order_id,
            comment: format!("Opened by {} strategy", strategy),
        };

        let mut state = self.state.lock();
        state.history.push(PositionRecord {
            timestamp: now,
            action: HistoryAction::Opened,
            key: key.clone(),
            exit_price: None,
            reason: None,
            position: position.clone(),
        });
        state.positions.insert(key.clone(), position);
        self.persist(&mut state);

        info!(
            key = %key,
            symbol = %symbol,
            side = %side,
            size,
            entry_price,
            strategy = %strategy,
            "System position tracked"
        );

        key
    }

    /// Classifies every open exchange position, adding untracked ones to the map.
    pub fn scan_and_classify_positions(
        &self,
        exchange_positions: &[ExchangePosition],
    ) -> BTreeMap<String, Classification> {
        self.scan_at(exchange_positions, Utc::now())
    }

    fn scan_at(
        &self,
        exchange_positions: &[ExchangePosition],
        now: DateTime<Utc>,
    ) -> BTreeMap<String, Classification> {
        let mut classified = BTreeMap::new();
        let mut discovered = Vec::new();
        let mut journal: Option<Vec<JournalEntry>> = None;

        let mut state = self.state.lock();

        for pos in exchange_positions.iter().filter(|p| p.is_open()) {
            let key = position_key(&pos.symbol, pos.side, pos.avg_price, pos.size);
            let age = age_days(pos.created_time, now);

            let newly_discovered = !state.positions.contains_key(&key);
            if newly_discovered {
                let origin = self.classify(pos, now, &mut journal);
                let tracked = TrackedPosition {
                    symbol: pos.symbol.clone(),
                    side: pos.side,
                    size: pos.size,
                    entry_price: pos.avg_price,
                    origin,
                    strategy: None,
                    created_time: now,
                    exchange_created_time: pos.created_time,
                    order_id: None,
                    comment: origin.comment(age),
                };

                info!(
                    key = %key,
                    symbol = %pos.symbol,
                    side = %pos.side,
                    size = pos.size,
                    entry_price = pos.avg_price,
                    origin = %origin,
                    "Discovered position"
                );

                state.history.push(PositionRecord {
                    timestamp: now,
                    action: HistoryAction::Discovered,
                    key: key.clone(),
                    exit_price: None,
                    reason: None,
                    position: tracked.clone(),
                });
                discovered.push((key.clone(), tracked.clone()));
                state.positions.insert(key.clone(), tracked);
            }

            if let Some(tracked) = state.positions.get(&key) {
                classified.insert(
                    key,
                    Classification {
                        origin: tracked.origin,
                        is_system: tracked.origin == PositionOrigin::System,
                        strategy: tracked.strategy.clone(),
                        age_days: age,
                        risk_level: self.assess_risk(tracked.origin, age),
                        comment: tracked.comment.clone(),
                        newly_discovered,
                    },
                );
            }
        }

        state.last_scan = Some(now);
        if !discovered.is_empty() {
            self.persist(&mut state);
        }
        drop(state);

        for (key, tracked) in discovered {
            self.notifier
                .send_async(Event::position_discovered(PositionDiscoveredData {
                    key,
                    symbol: tracked.symbol,
                    side: tracked.side.to_string(),
                    size: tracked.size,
                    entry_price: tracked.entry_price,
                    origin: tracked.origin.to_string(),
                    comment: tracked.comment,
                }));
        }

        classified
    }

    /// Infers the origin of an untracked position. Deterministic for fixed inputs.
    fn classify(
        &self,
        pos: &ExchangePosition,
        now: DateTime<Utc>,
        journal: &mut Option<Vec<JournalEntry>>,
    ) -> PositionOrigin {
        if let Some(created) = pos.created_time {
            let grace = ChronoDuration::from_std(self.config.startup_grace)
                .unwrap_or_else(|_| ChronoDuration::minutes(5));
            if created < self.startup_time - grace {
                return PositionOrigin::Inherited;
            }
            if (now - created).num_days() > self.config.stale_after_days as i64 {
                return PositionOrigin::External;
            }
        }

        let entries = journal.get_or_insert_with(|| {
            match self.journal.recent_entries(self.config.journal_lookback_lines) {
                Ok(entries) => entries,
                Err(e) => {
                    error!(error = %e, "Trade journal unreadable, treating as empty");
                    Vec::new()
                }
            }
        });

        let side = pos.side.as_journal_str();
        let matched = entries.iter().any(|entry| {
            entry.signal.contains(side)
                && (entry.entry_price - pos.avg_price).abs() < self.config.price_tolerance
        });

        if matched {
            debug!(symbol = %pos.symbol, "Position matched trade journal");
            PositionOrigin::System
        } else {
            PositionOrigin::External
        }
    }

    fn assess_risk(&self, origin: PositionOrigin, age_days: f64) -> RiskLevel {
        if origin == PositionOrigin::External {
            RiskLevel::High
        } else if age_days > self.config.stale_after_days as f64 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Moves a position from the live map to history. Returns the removed position.
    pub fn close_position(
        &self,
        key: &str,
        exit_price: f64,
        reason: &str,
    ) -> Option<TrackedPosition> {
        let mut state = self.state.lock();
        let Some(position) = state.positions.remove(key) else {
            debug!(key = %key, "Close requested for untracked position");
            return None;
        };

        state.history.push(PositionRecord {
            timestamp: Utc::now(),
            action: HistoryAction::Closed,
            key: key.to_string(),
            exit_price: Some(exit_price),
            reason: Some(reason.to_string()),
            position: position.clone(),
        });
        self.persist(&mut state);

        info!(
            key = %key,
            symbol = %position.symbol,
            side = %position.side,
            exit_price,
            reason = %reason,
            "Position closed"
        );

        Some(position)
    }

    pub fn get_position(&self, key: &str) -> Option<TrackedPosition> {
        self.state.lock().positions.get(key).cloned()
    }

    pub fn positions(&self) -> BTreeMap<String, TrackedPosition> {
        self.state.lock().positions.clone()
    }

    pub fn history(&self) -> Vec<PositionRecord> {
        self.state.lock().history.clone()
    }

    pub fn get_neural_data(&self) -> NeuralData {
        let now = Utc::now();
        let state = self.state.lock();

        let mut summary = PositionsSummary {
            total: state.positions.len(),
            ..PositionsSummary::default()
        };
        let mut counts: BTreeMap<PositionOrigin, usize> = BTreeMap::new();
        let mut total_age = 0.0;
        let mut positions = Vec::with_capacity(state.positions.len());

        for (key, pos) in &state.positions {
            match pos.origin {
                PositionOrigin::System => summary.system += 1,
                PositionOrigin::External => summary.external += 1,
                PositionOrigin::Inherited => summary.inherited += 1,
                PositionOrigin::Unknown => summary.unknown += 1,
            }
            *counts.entry(pos.origin).or_default() += 1;

            let age = pos.age_days(now);
            total_age += age;

            positions.push(NeuralPosition {
                key: key.clone(),
                symbol: pos.symbol.clone(),
                side: pos.side,
                size: pos.size,
                entry_price: pos.entry_price,
                origin: pos.origin,
                strategy: pos.strategy.clone(),
                age_hours: age * 24.0,
                risk_level: self.assess_risk(pos.origin, age),
            });
        }

        let insights = if summary.total == 0 {
            Insights {
                external_position_ratio: 0.0,
                avg_position_age_days: 0.0,
                most_common_origin: PositionOrigin::Unknown,
                risk_indicators: Vec::new(),
            }
        } else {
            let avg_age = total_age / summary.total as f64;
            // ties resolve to the first origin in declaration order
            let most_common = PositionOrigin::ALL
                .iter()
                .copied()
                .fold((PositionOrigin::Unknown, 0), |best, origin| {
                    let n = counts.get(&origin).copied().unwrap_or(0);
                    if n > best.1 { (origin, n) } else { best }
                })
                .0;

            let mut risk_indicators = Vec::new();
            if summary.external > 0 {
                risk_indicators.push("external_positions_detected".to_string());
            }
            if avg_age > self.config.stale_after_days as f64 {
                risk_indicators.push("old_positions_present".to_string());
            }

            Insights {
                external_position_ratio: summary.external as f64 / summary.total as f64,
                avg_position_age_days: avg_age,
                most_common_origin: most_common,
                risk_indicators,
            }
        };

        NeuralData {
            timestamp: now,
            system_startup: self.startup_time,
            positions_summary: summary,
            positions,
            insights,
        }
    }

    pub fn get_stats(&self) -> TrackerStats {
        let state = self.state.lock();
        let mut origins_breakdown: BTreeMap<PositionOrigin, usize> =
            PositionOrigin::ALL.iter().map(|o| (*o, 0)).collect();
        for pos in state.positions.values() {
            *origins_breakdown.entry(pos.origin).or_default() += 1;
        }

        TrackerStats {
            active_positions: state.positions.len(),
            total_history: state.history.len(),
            origins_breakdown,
            system_startup: self.startup_time,
            last_scan: state.last_scan,
        }
    }

    /// Writes both documents. Failures are logged; the next mutation retries.
    fn persist(&self, state: &mut State) {
        cap_history(&mut state.history, self.config.history_limit);

        let positions = TrackedPositionsDoc {
            version: TrackedPositionsDoc::SCHEMA_VERSION,
            saved_at: Utc::now(),
            positions: state.positions.clone(),
        };
        if let Err(e) = self.positions_store.save(&positions) {
            error!(path = %self.positions_store.path().display(), error = %e, "Failed to save tracked positions");
        }

        let history = PositionHistoryDoc {
            version: PositionHistoryDoc::SCHEMA_VERSION,
            records: state.history.clone(),
        };
        if let Err(e) = self.history_store.save(&history) {
            error!(path = %self.history_store.path().display(), error = %e, "Failed to save position history");
        }
    }
}

fn cap_history(history: &mut Vec<PositionRecord>, limit: usize) {
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}

#[cfg(test)]
mod tests;
