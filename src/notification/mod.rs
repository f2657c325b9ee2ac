//! Structured alert events and their delivery channels.

mod notifier;
mod telegram;

#[cfg(test)]
pub(crate) mod testing;

pub use notifier::{
    BlockCategory, BlockData, EmergencyResetData, EmergencyStopData, Event, EventData, EventType,
    MultiNotifier, NoopNotifier, NotificationError, Notifier, PositionDiscoveredData,
    RiskAlertData, Severity, ShutdownData, StartupData, TriggeredCondition, format_event,
};
pub use telegram::{TelegramConfig, TelegramNotifier};
