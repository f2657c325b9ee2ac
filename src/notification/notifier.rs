use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Тип события уведомления
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Активирована экстренная остановка
    EmergencyStop,
    /// Экстренная остановка сброшена администратором
    EmergencyReset,
    /// Ордер заблокирован риск-контролем
    OrderBlocked,
    /// Предупреждение о риске открытой позиции
    RiskAlert,
    /// Обнаружена неотслеживаемая позиция на бирже
    PositionDiscovered,
    /// Контур безопасности запущен
    Startup,
    /// Контур безопасности остановлен
    Shutdown,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::EmergencyStop => write!(f, "emergency_stop"),
            EventType::EmergencyReset => write!(f, "emergency_reset"),
            EventType::OrderBlocked => write!(f, "order_blocked"),
            EventType::RiskAlert => write!(f, "risk_alert"),
            EventType::PositionDiscovered => write!(f, "position_discovered"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Серьезность события
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Категория блокировки ордера
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    EmergencyStop,
    RiskLimit,
    PositionLimit,
    BalanceInsufficient,
    MarketRisk,
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockCategory::EmergencyStop => write!(f, "emergency_stop"),
            BlockCategory::RiskLimit => write!(f, "risk_limit"),
            BlockCategory::PositionLimit => write!(f, "position_limit"),
            BlockCategory::BalanceInsufficient => write!(f, "balance_insufficient"),
            BlockCategory::MarketRisk => write!(f, "market_risk"),
        }
    }
}

/// Сработавшее условие экстренной остановки
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredCondition {
    pub name: String,
    pub observed: f64,
    pub threshold: f64,
}

impl fmt::Display for TriggeredCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (порог {})", self.name, self.observed, self.threshold)
    }
}

/// Данные об экстренной остановке
#[derive(Debug, Clone)]
pub struct EmergencyStopData {
    /// Компонент, который остановил торговлю
    pub source: String,
    pub reason: String,
    pub triggered: Vec<TriggeredCondition>,
}

/// Данные о сбросе экстренной остановки
#[derive(Debug, Clone)]
pub struct EmergencyResetData {
    pub source: String,
    /// Условия, которые были активны до сброса
    pub cleared: Vec<String>,
}

/// Данные о заблокированном ордере
#[derive(Debug, Clone)]
pub struct BlockData {
    pub category: BlockCategory,
    pub symbol: String,
    pub strategy: String,
    pub reason: String,
}

/// Данные предупреждения о риске позиции
#[derive(Debug, Clone)]
pub struct RiskAlertData {
    pub strategy: String,
    pub symbol: String,
    pub message: String,
    pub loss_pct: Option<f64>,
}

/// Данные об обнаруженной позиции
#[derive(Debug, Clone)]
pub struct PositionDiscoveredData {
    pub key: String,
    pub symbol: String,
    pub side: String,
    pub size: f64,
    pub entry_price: f64,
    pub origin: String,
    pub comment: String,
}

/// Данные о запуске
#[derive(Debug, Clone)]
pub struct StartupData {
    pub app_name: String,
    pub version: String,
    pub accounts: Vec<String>,
}

/// Данные об остановке
#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
}

/// Данные события
#[derive(Debug, Clone)]
pub enum EventData {
    EmergencyStop(EmergencyStopData),
    EmergencyReset(EmergencyResetData),
    OrderBlocked(BlockData),
    RiskAlert(RiskAlertData),
    PositionDiscovered(PositionDiscoveredData),
    Startup(StartupData),
    Shutdown(ShutdownData),
}

/// Событие уведомления
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, severity: Severity, data: EventData) -> Self {
        Self {
            event_type,
            severity,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn emergency_stop(data: EmergencyStopData) -> Self {
        Self::new(
            EventType::EmergencyStop,
            Severity::Critical,
            EventData::EmergencyStop(data),
        )
    }

    pub fn emergency_reset(data: EmergencyResetData) -> Self {
        Self::new(
            EventType::EmergencyReset,
            Severity::Warning,
            EventData::EmergencyReset(data),
        )
    }

    pub fn order_blocked(data: BlockData) -> Self {
        let severity = match data.category {
            BlockCategory::EmergencyStop => Severity::Critical,
            _ => Severity::Warning,
        };
        Self::new(EventType::OrderBlocked, severity, EventData::OrderBlocked(data))
    }

    pub fn risk_alert(data: RiskAlertData) -> Self {
        Self::new(EventType::RiskAlert, Severity::Warning, EventData::RiskAlert(data))
    }

    pub fn position_discovered(data: PositionDiscoveredData) -> Self {
        Self::new(
            EventType::PositionDiscovered,
            Severity::Info,
            EventData::PositionDiscovered(data),
        )
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, Severity::Info, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, Severity::Info, EventData::Shutdown(data))
    }

    /// Короткий заголовок события
    pub fn title(&self) -> &'static str {
        match self.event_type {
            EventType::EmergencyStop => "ЭКСТРЕННАЯ ОСТАНОВКА ТОРГОВЛИ",
            EventType::EmergencyReset => "Экстренная остановка сброшена",
            EventType::OrderBlocked => "Ордер заблокирован",
            EventType::RiskAlert => "Риск позиции",
            EventType::PositionDiscovered => "Обнаружена позиция",
            EventType::Startup => "Контур безопасности запущен",
            EventType::Shutdown => "Контур безопасности остановлен",
        }
    }

    /// Полный текст события
    pub fn body(&self) -> String {
        format_event(self)
    }

    /// Имена и значения сработавших условий (пусто для прочих событий)
    pub fn triggered_conditions(&self) -> Vec<String> {
        match &self.data {
            EventData::EmergencyStop(data) => data.triggered.iter().map(|c| c.to_string()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Трейт для отправки уведомлений
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Отправить уведомление синхронно
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Отправить уведомление асинхронно (без блокировки)
    fn send_async(&self, event: Event);

    /// Проверить, включены ли уведомления для данного типа событий
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Закрыть notifier
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Ошибка уведомления
#[derive(Debug, Clone, thiserror::Error)]
#[error("NotificationError: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// MultiNotifier отправляет уведомления нескольким notifier'ам
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// NoopNotifier - пустая реализация
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Функции форматирования ===

/// Форматирует экстренную остановку
pub fn format_emergency_stop(data: &EmergencyStopData) -> String {
    let conditions = if data.triggered.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = data.triggered.iter().map(|c| format!("• {}", c)).collect();
        format!("\nУсловия:\n{}", lines.join("\n"))
    };

    format!(
        "🚨 *ЭКСТРЕННАЯ ОСТАНОВКА ТОРГОВЛИ*\n\n\
         Источник: {}\n\
         Причина: {}{}\n\n\
         ⏰ {}",
        data.source,
        data.reason,
        conditions,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует сброс экстренной остановки
pub fn format_emergency_reset(data: &EmergencyResetData) -> String {
    let cleared = if data.cleared.is_empty() {
        "нет".to_string()
    } else {
        data.cleared.join(", ")
    };

    format!(
        "🔄 *Экстренная остановка сброшена*\n\n\
         Источник: {}\n\
         Сброшенные условия: {}\n\n\
         ⏰ {}",
        data.source,
        cleared,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует блокировку ордера
pub fn format_order_blocked(data: &BlockData) -> String {
    format!(
        "⛔ *Ордер заблокирован*\n\n\
         Категория: {}\n\
         Стратегия: {}\n\
         Инструмент: {} #{}\n\
         Причина: {}\n\n\
         ⏰ {}",
        data.category,
        data.strategy,
        data.symbol,
        escape_markdown(&data.symbol),
        data.reason,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует предупреждение о риске
pub fn format_risk_alert(data: &RiskAlertData) -> String {
    let loss = data
        .loss_pct
        .map(|l| format!("\nУбыток: *{:.2}%*", l))
        .unwrap_or_default();

    format!(
        "⚠️ *Риск позиции*\n\n\
         Стратегия: {}\n\
         Инструмент: {}\n\
         {}{}\n\n\
         ⏰ {}",
        data.strategy,
        data.symbol,
        data.message,
        loss,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует обнаруженную позицию
pub fn format_position_discovered(data: &PositionDiscoveredData) -> String {
    format!(
        "🔍 *Обнаружена позиция*\n\n\
         {} {} {} @ {:.2}\n\
         Происхождение: {}\n\
         {}\n\n\
         ⏰ {}",
        data.symbol,
        data.side,
        data.size,
        data.entry_price,
        data.origin,
        data.comment,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует запуск
pub fn format_startup(data: &StartupData) -> String {
    let accounts = if data.accounts.is_empty() {
        "нет".to_string()
    } else {
        data.accounts.join(", ")
    };

    format!(
        "🛡 *Контур безопасности запущен*\n\n\
         Приложение: {}\n\
         Версия: {}\n\
         Аккаунты: {}\n\n\
         ⏰ {}",
        data.app_name,
        data.version,
        accounts,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует остановку
pub fn format_shutdown(data: &ShutdownData) -> String {
    format!(
        "🛑 *Контур безопасности остановлен*\n\n\
         Причина: {}\n\
         Время работы: {}\n\n\
         ⏰ {}",
        data.reason,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Форматирует событие в строку
pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::EmergencyStop(data) => format_emergency_stop(data),
        EventData::EmergencyReset(data) => format_emergency_reset(data),
        EventData::OrderBlocked(data) => format_order_blocked(data),
        EventData::RiskAlert(data) => format_risk_alert(data),
        EventData::PositionDiscovered(data) => format_position_discovered(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
    }
}

// === Вспомогательные функции ===

/// Экранирует подчеркивания для Telegram Markdown
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
}

/// Форматирует длительность
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}с", secs)
    } else if secs < 3600 {
        format!("{}м {}с", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}ч {}м", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}д {}ч", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
