//! ABOUTME: SMTP mailer built on lettre plus `{{ name }}` placeholder rendering
//! ABOUTME: Without SMTP settings the mailer is disabled and reports NotConfigured

use crate::{NotifyError, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor,
};
use regex::{Captures, Regex};
use sb_config::MailConfig;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

const IMPLICIT_TLS_PORT: u16 = 465;

static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

fn placeholder() -> Option<&'static Regex> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").ok())
        .as_ref()
}

/// Substitute `{{ name }}` placeholders; unknown names render as empty text
pub fn render_template(html: &str, vars: &HashMap<&str, String>) -> String {
    match placeholder() {
        Some(re) => re
            .replace_all(html, |caps: &Captures| {
                vars.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned(),
        None => html.to_string(),
    }
}

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("enabled", &self.is_enabled())
            .field("from", &self.from.as_ref().map(|m| m.to_string()))
            .finish()
    }
}

impl Mailer {
    /// A mailer that never sends
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: None,
        }
    }

    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let (Some(smtp), Some(address)) = (&config.smtp, &config.from_address) else {
            info!("SMTP not configured; outgoing mail disabled");
            return Ok(Self::disabled());
        };

        let address = address
            .parse()
            .map_err(|e| NotifyError::Address(format!("{}: {}", address, e)))?;
        let from = Mailbox::new(config.from_name.clone(), address);

        let builder = if smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
            .build();

        info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
        Ok(Self {
            transport: Some(transport),
            from: Some(from),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    #[instrument(skip(self, html))]
    pub async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            info!("Mail to {} skipped: SMTP is not configured", to);
            return Err(NotifyError::NotConfigured("SMTP mailer".to_string()));
        };

        let recipient: Mailbox = to
            .parse()
            .map_err(|e| NotifyError::Address(format!("{}: {}", to, e)))?;

        let email = Email::builder()
            .from(from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        transport.send(email).await.map_err(|e| {
            warn!("SMTP delivery to {} failed: {}", to, e);
            NotifyError::Smtp(e.to_string())
        })?;

        debug!("Mail delivered to {}", to);
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Err(NotifyError::NotConfigured("SMTP mailer".to_string()));
        };
        match transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(NotifyError::Smtp("SMTP server refused connection".to_string())),
            Err(e) => Err(NotifyError::Smtp(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_config::SmtpConfig;

    #[test]
    fn test_render_template_substitutes_placeholders() {
        let vars = HashMap::from([
            ("reset_url", "https://stanbase.test/reset?token=abc".to_string()),
            ("site_url", "https://stanbase.test".to_string()),
        ]);
        let html = "<a href=\"{{reset_url}}\">Reset</a> on {{ site_url }}{{ missing }}";
        assert_eq!(
            render_template(html, &vars),
            "<a href=\"https://stanbase.test/reset?token=abc\">Reset</a> on https://stanbase.test"
        );
        assert_eq!(render_template("no placeholders", &vars), "no placeholders");
    }

    #[tokio::test]
    async fn test_disabled_mailer_reports_not_configured() {
        let mailer = Mailer::from_config(&MailConfig::default()).expect("mailer");
        assert!(!mailer.is_enabled());
        let err = mailer
            .send_html("someone@example.com", "Hi", "<p>Hi</p>")
            .await
            .expect_err("disabled");
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }

    #[test]
    fn test_configured_mailer_rejects_bad_sender() {
        let config = MailConfig {
            smtp: Some(SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 587,
                username: "user".to_string(),
                password: "secret".to_string(),
            }),
            from_address: Some("not an address".to_string()),
            from_name: Some("Stanbase".to_string()),
        };
        assert!(matches!(
            Mailer::from_config(&config),
            Err(NotifyError::Address(_))
        ));

        let valid = MailConfig {
            from_address: Some("noreply@stanbase.test".to_string()),
            ..config
        };
        let mailer = Mailer::from_config(&valid).expect("mailer");
        assert!(mailer.is_enabled());
    }
}
