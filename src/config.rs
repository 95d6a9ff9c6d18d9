use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub fetcher: FetcherConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin all relative product links are resolved against.
    pub base_url: String,
    /// Brand name used for verification, matched case-insensitively.
    pub brand: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub request_timeout: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between scan cycles in continuous mode.
    pub scan_interval: u64,
    /// Minimum delay between page requests within a cycle.
    pub request_delay_ms: u64,
    /// Seconds to wait after a failed cycle before retrying.
    pub failure_cooldown: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("site.base_url", "https://www.firstcry.com")?
            .set_default("site.brand", "hot wheels")?
            .set_default("fetcher.request_timeout", 10)?
            .set_default(
                "fetcher.user_agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )?
            .set_default("database.url", "sqlite://shelfwatch.db")?
            .set_default("database.max_connections", 5)?
            .set_default("telegram.bot_token", "")?
            .set_default("telegram.chat_id", "")?
            .set_default("monitor.scan_interval", 120)?
            .set_default("monitor.request_delay_ms", 500)?
            .set_default("monitor.failure_cooldown", 60)?
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SHELFWATCH_"
            .add_source(Environment::with_prefix("SHELFWATCH").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Messaging credentials are supplied out of band, never from files.
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }
        if let Ok(chat_id) = env::var("TELEGRAM_CHAT_ID") {
            config.telegram.chat_id = chat_id;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate site configuration
        if Url::parse(&self.site.base_url).is_err() {
            return Err(ConfigError::Message("Invalid site base URL format".into()));
        }

        if self.site.brand.trim().is_empty() {
            return Err(ConfigError::Message("Site brand must not be empty".into()));
        }

        // Validate fetcher configuration
        if self.fetcher.request_timeout == 0 {
            return Err(ConfigError::Message(
                "Fetcher request_timeout must be greater than 0".into(),
            ));
        }

        // Validate database configuration
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        // Validate messaging credentials - fail fast when absent
        if self.telegram.bot_token.is_empty() || self.telegram.chat_id.is_empty() {
            return Err(ConfigError::Message(
                "Missing Telegram credentials: set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID".into(),
            ));
        }

        // Validate monitor configuration
        if self.monitor.scan_interval == 0 {
            return Err(ConfigError::Message(
                "Monitor scan_interval must be greater than 0".into(),
            ));
        }

        if self.monitor.failure_cooldown == 0 {
            return Err(ConfigError::Message(
                "Monitor failure_cooldown must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
