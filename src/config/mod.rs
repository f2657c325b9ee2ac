//! Configuration loading and validation for the trading safety plane.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for notification credentials. Numeric
//! thresholds that are out of range fall back to built-in defaults with a
//! warning instead of refusing to start.

mod app;
mod balance;
mod duration;
mod emergency;
mod error;
mod notification;
mod risk;
mod tracker;

pub use app::AppConfig;
pub use balance::BalanceConfig;
pub use emergency::EmergencyConfig;
pub use error::ConfigError;
pub use notification::{NotificationConfig, TelegramConfig};
pub use risk::{RiskConfig, RiskLimits, RiskLimitsOverride};
pub use tracker::TrackerConfig;

use serde::Deserialize;
use std::{env, fs, time::Duration};
use tracing::warn;

/// Root configuration structure.
///
/// Required sections: app.
/// Optional sections: risk, balance, emergency, tracker, notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Global and per-strategy risk limits (optional).
    pub risk: Option<RiskConfig>,
    /// Margin and equity gate thresholds (optional).
    pub balance: Option<BalanceConfig>,
    /// Emergency stop monitor thresholds (optional).
    pub emergency: Option<EmergencyConfig>,
    /// Position tracker storage and classification (optional).
    pub tracker: Option<TrackerConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;

        Ok(config)
    }

    /// Like [`Config::load`], but any read, parse or validation failure
    /// yields the built-in defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path, error = %e, "Config unusable, falling back to defaults");
                Self::default()
            }
        }
    }

    /// Parses, fills credentials, validates and sanitizes a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config.sanitized())
    }

    /// Risk section, or defaults.
    pub fn risk(&self) -> RiskConfig {
        self.risk.clone().unwrap_or_default()
    }

    /// Balance section, or defaults.
    pub fn balance(&self) -> BalanceConfig {
        self.balance.clone().unwrap_or_default()
    }

    /// Emergency section, or defaults.
    pub fn emergency(&self) -> EmergencyConfig {
        self.emergency.clone().unwrap_or_default()
    }

    /// Tracker section, or defaults.
    pub fn tracker(&self) -> TrackerConfig {
        self.tracker.clone().unwrap_or_default()
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the structural parts of the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let is_production = self.app.env != "development";

        if let Some(ref notification) = self.notification {
            if let Some(ref telegram) = notification.telegram {
                if is_production
                    && telegram.enabled
                    && (telegram.bot_token.is_empty() || telegram.chat_id.is_empty())
                {
                    return Err(ConfigError::Validation(
                        "telegram: credentials not found (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID env vars)".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Replace out-of-range thresholds with defaults.
    fn sanitized(self) -> Self {
        Self {
            app: self.app,
            risk: self.risk.map(RiskConfig::sanitized),
            balance: self.balance.map(BalanceConfig::sanitized),
            emergency: self.emergency.map(EmergencyConfig::sanitized),
            tracker: self.tracker.map(TrackerConfig::sanitized),
            notification: self.notification,
        }
    }
}

/// Returns `value` when it is finite and non-negative, `default` otherwise.
pub(crate) fn non_negative(value: f64, default: f64, section: &str, key: &str) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!(section = %section, key = %key, value, default, "Invalid threshold, using default");
        default
    }
}

/// Returns `value` unless it is zero.
pub(crate) fn non_zero(value: Duration, default: Duration, section: &str, key: &str) -> Duration {
    if value.is_zero() {
        warn!(section = %section, key = %key, default = ?default, "Zero duration, using default");
        default
    } else {
        value
    }
}
