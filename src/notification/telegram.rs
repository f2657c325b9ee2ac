use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::notification::{Event, EventType, NotificationError, Notifier, Severity, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Конфигурация Telegram notifier
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Токен бота от BotFather
    pub bot_token: String,
    /// ID чата для отправки уведомлений
    pub chat_id: String,
    /// Опциональный ID чата для критических событий
    pub error_chat_id: Option<String>,
    /// Уведомления об экстренной остановке и ее сбросе
    pub notify_emergency: bool,
    /// Уведомления о заблокированных ордерах
    pub notify_blocks: bool,
    /// Предупреждения о рисках позиций и найденных позициях
    pub notify_alerts: bool,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            error_chat_id: None,
            notify_emergency: true,
            notify_blocks: true,
            notify_alerts: true,
        }
    }

    pub fn with_error_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.error_chat_id = Some(chat_id.into());
        self
    }

    /// Собирает конфигурацию из секции `notification.telegram`
    pub fn from_settings(settings: &crate::config::TelegramConfig) -> Self {
        let mut config = Self::new(settings.bot_token.clone(), settings.chat_id.clone());
        if !settings.error_chat_id.is_empty() {
            config = config.with_error_chat_id(settings.error_chat_id.clone());
        }
        config.notify_emergency = settings.notify_emergency;
        config.notify_blocks = settings.notify_blocks;
        config.notify_alerts = settings.notify_alerts;
        config
    }

    fn chat_for(&self, event: &Event) -> &str {
        if event.severity == Severity::Critical {
            self.error_chat_id.as_deref().unwrap_or(&self.chat_id)
        } else {
            &self.chat_id
        }
    }
}

/// Telegram Notifier для отправки уведомлений через Telegram Bot API
pub struct TelegramNotifier {
    config: TelegramConfig,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    /// Создает новый TelegramNotifier. Должен вызываться внутри runtime tokio.
    pub fn new(config: TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        let notifier = Self {
            config: config.clone(),
            http_client: http_client.clone(),
            api_url: api_url.clone(),
            sender,
        };

        // Запускаем воркер для асинхронной обработки
        Self::spawn_worker(receiver, config, http_client, api_url);

        Ok(notifier)
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        config: TelegramConfig,
        http_client: reqwest::Client,
        api_url: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let chat_id = config.chat_for(&event);
                let text = format_event(&event);
                if let Err(e) =
                    Self::send_message_to_chat_static(&http_client, &api_url, chat_id, &text).await
                {
                    error!(error = %e, event_type = %event.event_type, "Failed to send Telegram message");
                }
            }
        });
    }

    async fn send_message_to_chat_static(
        http_client: &reqwest::Client,
        api_url: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), NotificationError> {
        // Обрезаем сообщение если превышает лимит Telegram
        let text = truncate_message(text);

        let url = format!("{}/sendMessage", api_url);

        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let response = http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotificationError::new(format!(
                "Telegram API error: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Обрезает текст до лимита Telegram по границе символа
fn truncate_message(text: &str) -> &str {
    if text.len() <= MAX_MESSAGE_LENGTH {
        return text;
    }
    let mut end = MAX_MESSAGE_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let chat_id = self.config.chat_for(event);
        let text = format_event(event);
        Self::send_message_to_chat_static(&self.http_client, &self.api_url, chat_id, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::EmergencyStop | EventType::EmergencyReset => self.config.notify_emergency,
            EventType::OrderBlocked => self.config.notify_blocks,
            EventType::RiskAlert | EventType::PositionDiscovered => self.config.notify_alerts,
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Даем время воркеру обработать оставшиеся сообщения
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{BlockCategory, BlockData, EmergencyStopData};

    #[test]
    fn test_truncate_message_respects_char_boundary() {
        let text = "я".repeat(MAX_MESSAGE_LENGTH);
        let truncated = truncate_message(&text);
        assert!(truncated.len() <= MAX_MESSAGE_LENGTH);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_critical_events_go_to_error_chat() {
        let config = TelegramConfig::new("token", "main").with_error_chat_id("errors");

        let critical = Event::emergency_stop(EmergencyStopData {
            source: "emergency_stop_manager".to_string(),
            reason: "test".to_string(),
            triggered: Vec::new(),
        });
        let warning = Event::order_blocked(BlockData {
            category: BlockCategory::RiskLimit,
            symbol: "BTCUSDT".to_string(),
            strategy: "s1".to_string(),
            reason: "limit".to_string(),
        });

        assert_eq!(config.chat_for(&critical), "errors");
        assert_eq!(config.chat_for(&warning), "main");
    }

    #[tokio::test]
    async fn test_is_enabled_follows_flags() {
        let mut config = TelegramConfig::new("token", "chat");
        config.notify_blocks = false;
        let notifier = TelegramNotifier::new(config).unwrap();

        assert!(notifier.is_enabled(EventType::EmergencyStop));
        assert!(notifier.is_enabled(EventType::Startup));
        assert!(!notifier.is_enabled(EventType::OrderBlocked));
        assert!(notifier.is_enabled(EventType::RiskAlert));
    }

    #[test]
    fn test_new_requires_credentials() {
        assert!(TelegramNotifier::new(TelegramConfig::new("", "chat")).is_err());
        assert!(TelegramNotifier::new(TelegramConfig::new("token", "")).is_err());
    }
}
