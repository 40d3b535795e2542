use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::dto::ContactRequest;
use crate::{
    config::MailConfig,
    mail::{Delivery, MailRelay, OutgoingEmail},
    store::{Collection, Document, DocumentStore, Filter, StoreError},
    validation::{char_len_within, is_valid_email, normalize_email},
};

pub const MAX_NAME_LENGTH: usize = 120;
pub const MAX_MESSAGE_LENGTH: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a contact submission. Either half may have degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactReceipt {
    pub message_id: Option<String>,
    pub stored: bool,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub messages: usize,
    pub unread: usize,
}

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn DocumentStore>,
    relay: Arc<dyn MailRelay>,
    mail: MailConfig,
}

impl ContactService {
    pub fn new(store: Arc<dyn DocumentStore>, relay: Arc<dyn MailRelay>, mail: MailConfig) -> Self {
        Self { store, relay, mail }
    }

    /// Persist the message, then hand it to the relay.
    ///
    /// A store failure is only fatal when the relay did not deliver either;
    /// otherwise it is reported through `stored = false`.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn submit(&self, req: ContactRequest) -> Result<ContactReceipt, ContactError> {
        let req = validate(req)?;

        let mut fields = Map::new();
        fields.insert("name".into(), Value::from(req.name.as_str()));
        fields.insert("email".into(), Value::from(req.email.as_str()));
        fields.insert("message".into(), Value::from(req.message.as_str()));
        fields.insert("read".into(), Value::Bool(false));

        let (message_id, store_err) = match self
            .store
            .create(Collection::Messages.name(), fields)
            .await
        {
            Ok(doc) => (Some(doc.id), None),
            Err(e) => {
                warn!(error = %e, "contact message not persisted");
                (None, Some(e))
            }
        };

        let email = compose(&req, &self.mail);
        let delivery = match self.relay.deliver(&email).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "mail relay failed");
                Delivery::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if let Some(err) = store_err {
            if delivery != Delivery::Sent {
                return Err(err.into());
            }
        }

        info!(message_id = ?message_id, delivery = ?delivery, "contact message handled");
        Ok(ContactReceipt {
            stored: message_id.is_some(),
            message_id,
            delivery,
        })
    }

    pub async fn list_messages(&self, limit: Option<usize>) -> Result<Vec<Document>, StoreError> {
        self.store
            .list(Collection::Messages.name(), &Filter::new(), limit)
            .await
    }

    /// `None` when no message has that id.
    pub async fn mark_read(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let mut fields = Map::new();
        fields.insert("read".into(), Value::Bool(true));
        self.store
            .update(Collection::Messages.name(), &Filter::by_id(id), fields)
            .await
    }

    pub async fn stats(&self) -> Result<MessageStats, StoreError> {
        let all = self.list_messages(None).await?;
        let unread = all
            .iter()
            .filter(|d| d.get("read") == Some(&Value::Bool(false)))
            .count();
        Ok(MessageStats {
            messages: all.len(),
            unread,
        })
    }
}

fn validate(req: ContactRequest) -> Result<ContactRequest, ContactError> {
    let name = req.name.trim().to_string();
    if !char_len_within(&name, 1, MAX_NAME_LENGTH) {
        return Err(ContactError::Validation(format!(
            "Name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ContactError::Validation("Invalid email".into()));
    }
    if !char_len_within(req.message.trim(), 1, MAX_MESSAGE_LENGTH) {
        return Err(ContactError::Validation(format!(
            "Message must be between 1 and {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(ContactRequest {
        name,
        email,
        message: req.message,
    })
}

fn compose(req: &ContactRequest, mail: &MailConfig) -> OutgoingEmail {
    OutgoingEmail {
        to: mail.recipient.clone(),
        from: mail.sender.clone().unwrap_or_else(|| req.email.clone()),
        reply_to: req.email.clone(),
        subject: format!("FastDevp Contact - {}", req.name),
        body: format!(
            "New contact from FastDevp\n\nName: {}\nEmail: {}\n\nMessage:\n{}",
            req.name,
            req.email,
            req.message.trim()
        ),
    }
}
