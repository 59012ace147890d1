//! ABOUTME: Outbound notifiers for the Telegram feedback bot and SMTP mail
//! ABOUTME: Defines the Notifier trait, delivery errors and the message type

use async_trait::async_trait;
use sb_core::Id;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod feedback;
pub mod mailer;
pub mod retry;
pub mod telegram;

pub use feedback::format_feedback_message;
pub use mailer::{render_template, Mailer};
pub use retry::{RetryConfig, RetryWrapper};
pub use telegram::TelegramNotifier;

/// Result type for delivery operations
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur while delivering a message
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("Telegram API returned {status}: {body}")]
    Telegram { status: u16, body: String },
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Invalid address: {0}")]
    Address(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Retry exhausted: {0}")]
    RetryExhausted(String),
}

impl NotifyError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            NotifyError::Telegram { status, .. } => *status == 429 || *status >= 500,
            NotifyError::Smtp(_) => true,
            NotifyError::NotConfigured(_)
            | NotifyError::Address(_)
            | NotifyError::Serialization(_)
            | NotifyError::RetryExhausted(_) => false,
        }
    }
}

impl From<NotifyError> for sb_core::Error {
    fn from(err: NotifyError) -> Self {
        sb_core::Error::External(err.to_string())
    }
}

/// A message handed to a notifier; `body` is HTML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Core trait for delivery channels
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message
    async fn send(&self, msg: &Message) -> Result<()>;

    /// Check if the channel is usable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}
