use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info};

use crate::config::TelegramConfig;
use crate::models::NotificationKind;
use crate::Result;

/// One decided alert, ready for formatting and delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: NotificationKind,
    pub product_name: String,
    pub price: Option<Decimal>,
    pub url: String,
    pub detected_at: DateTime<Utc>,
}

/// Outbound messaging channel. Returns Ok(false) when the channel rejected
/// the message; Err only for transport problems. Either way the caller
/// treats delivery failure as logged-and-counted, never retried in-cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<bool>;
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_api_base("https://api.telegram.org", config)
    }

    /// Point at a different API origin (used by tests against a local mock).
    pub fn with_api_base(base: &str, config: &TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: format!("{base}/bot{}/sendMessage", config.bot_token),
            chat_id: config.chat_id.clone(),
        }
    }

    fn format_message(alert: &Alert) -> String {
        let headline = match alert.kind {
            NotificationKind::New => "🆕 NEW PRODUCT ALERT",
            NotificationKind::Restock => "🔄 RESTOCK ALERT",
        };
        let price = alert
            .price
            .map(|p| format!("₹{p}"))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "{headline}\n\n🏎️ *{name}*\n\n💰 Price: {price}\n\n🛒 Buy Now: {url}\n\n⏰ Detected: {detected}",
            name = alert.product_name,
            url = alert.url,
            detected = alert.detected_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, alert: &Alert) -> Result<bool> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": Self::format_message(alert),
            "parse_mode": "Markdown",
            "disable_web_page_preview": false,
        });

        let response = self.client.post(&self.api_url).json(&payload).send().await?;

        if response.status().is_success() {
            info!(product = %alert.product_name, "notification sent");
            Ok(true)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "failed to send notification");
            Ok(false)
        }
    }
}
