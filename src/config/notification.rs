//! Notification configuration.

use serde::Deserialize;

/// Notification settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot notifications.
    pub telegram: Option<TelegramConfig>,
}

/// Telegram notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether Telegram notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// Target chat/channel ID (loaded from TELEGRAM_CHAT_ID env var).
    #[serde(skip)]
    pub chat_id: String,
    /// Target chat ID for emergency escalations (loaded from TELEGRAM_ERROR_CHAT_ID env var).
    #[serde(skip)]
    pub error_chat_id: String,
    /// Send emergency stop and reset notices.
    #[serde(default = "default_true")]
    pub notify_emergency: bool,
    /// Send a notice for every blocked order.
    #[serde(default)]
    pub notify_blocks: bool,
    /// Send position risk alerts and discovered-position notices.
    #[serde(default)]
    pub notify_alerts: bool,
}

fn default_true() -> bool {
    true
}
