//! ABOUTME: Telegram Bot API notifier used to forward visitor feedback
//! ABOUTME: Posts HTML messages to a single configured chat

use crate::{Message, Notifier, NotifyError, Result};
use async_trait::async_trait;
use reqwest::Client;
use sb_config::TelegramConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self { client, config }
    }

    pub fn with_client(config: TelegramConfig, client: Client) -> Self {
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (self.config.bot_token.as_deref(), self.config.chat_id.as_deref()) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Ok((token, chat))
            }
            _ => Err(NotifyError::NotConfigured("Telegram bot".to_string())),
        }
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, msg: &Message) -> Result<()> {
        let (token, chat_id) = self.credentials()?;

        debug!(message_id = %msg.id, "Sending Telegram message");
        let response = self
            .client
            .post(self.endpoint(token))
            .json(&SendMessage {
                chat_id,
                text: &msg.body,
                parse_mode: "HTML",
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(message_id = %msg.id, "Telegram message delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(message_id = %msg.id, status = status.as_u16(), "Telegram rejected message");
        Err(NotifyError::Telegram {
            status: status.as_u16(),
            body,
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.credentials().map(|_| ())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_bot_skips_network() {
        let notifier = TelegramNotifier::new(TelegramConfig {
            bot_token: Some("token".to_string()),
            chat_id: None,
            // Unroutable; any request would fail with a connect error instead
            api_base: "http://127.0.0.1:9".to_string(),
        });

        assert!(!notifier.is_configured());
        let err = notifier
            .send(&Message::new("Feedback", "hello"))
            .await
            .expect_err("must not send");
        assert!(matches!(err, NotifyError::NotConfigured(_)));
        assert!(notifier.health_check().await.is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let notifier = TelegramNotifier::new(TelegramConfig {
            bot_token: Some("abc".to_string()),
            chat_id: Some("-100".to_string()),
            api_base: "https://api.telegram.org/".to_string(),
        });
        assert_eq!(
            notifier.endpoint("abc"),
            "https://api.telegram.org/botabc/sendMessage"
        );
    }
}
