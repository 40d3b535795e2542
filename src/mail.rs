//! Outbound mail relay for contact messages.
//!
//! Delivery is best effort: callers persist first and treat a relay failure
//! as a reportable outcome, never as a reason to roll back.

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

/// What happened to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Delivery {
    /// Accepted by the relay.
    Sent,
    /// No relay configured; the email only went to the log.
    #[serde(rename = "queued")]
    Logged,
    /// The relay refused or could not be reached.
    Failed { reason: String },
}

#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<Delivery>;
}

/// Fallback used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogRelay;

#[async_trait]
impl MailRelay for LogRelay {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<Delivery> {
        warn!("no mail relay configured; email logged instead of sent");
        info!(
            to = %email.to,
            reply_to = %email.reply_to,
            subject = %email.subject,
            body = %email.body,
            "contact email"
        );
        Ok(Delivery::Logged)
    }
}

/// Posts the email as JSON to an HTTP mail gateway.
#[derive(Debug, Clone)]
pub struct WebhookRelay {
    client: reqwest::Client,
    url: String,
}

impl WebhookRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MailRelay for WebhookRelay {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<Delivery> {
        let res = self
            .client
            .post(&self.url)
            .json(email)
            .send()
            .await
            .context("mail webhook request")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("mail webhook returned {status}: {body}");
        }
        info!(to = %email.to, subject = %email.subject, "contact email relayed");
        Ok(Delivery::Sent)
    }
}
