//! Outbound email for studio notifications
//!
//! Delivery is best-effort: messages are written to the log instead of an
//! SMTP relay, and callers never roll back their work when sending fails.

use std::env;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while sending an email
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MailError {
    /// Outbound mail is switched off
    #[error("Email delivery is disabled")]
    Disabled,

    /// Recipient address is unusable
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
}

/// Mailer configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Sender address shown on every message
    pub from_address: String,
    /// Whether messages are delivered at all
    pub enabled: bool,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MAIL_FROM`: Sender address (default: "studio@localhost")
    /// - `MAIL_ENABLED`: "false" disables delivery (default: "true")
    pub fn from_env() -> Self {
        let from_address = env::var("MAIL_FROM").unwrap_or_else(|_| "studio@localhost".to_string());
        let enabled = env::var("MAIL_ENABLED")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            from_address,
            enabled,
        }
    }
}

/// A single outgoing message
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Log-backed mailer
#[derive(Debug, Clone)]
pub struct Mailer {
    config: MailerConfig,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Self {
        Self { config }
    }

    /// Send a message
    pub async fn send(&self, email: &Email) -> Result<(), MailError> {
        if !self.config.enabled {
            return Err(MailError::Disabled);
        }

        let to = email.to.trim();
        if to.is_empty() || !to.contains('@') {
            return Err(MailError::InvalidRecipient(email.to.clone()));
        }

        info!(
            from = %self.config.from_address,
            to = %to,
            subject = %email.subject,
            "Email sent: {}",
            email.body
        );

        Ok(())
    }

    /// Send a message, logging instead of returning failures
    pub async fn send_best_effort(&self, email: &Email) {
        if let Err(e) = self.send(email).await {
            warn!("Failed to send email '{}' to {}: {}", email.subject, email.to, e);
        }
    }
}
