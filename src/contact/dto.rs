use serde::{Deserialize, Serialize};

use super::service::{ContactReceipt, MessageStats};
use crate::{auth::dto::PublicUser, mail::Delivery};

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub message_id: Option<String>,
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl From<ContactReceipt> for ContactResponse {
    fn from(r: ContactReceipt) -> Self {
        let note = match (&r.delivery, r.stored) {
            (Delivery::Logged, _) => Some("Email not sent (no mail relay configured)"),
            (Delivery::Failed { .. }, _) => Some("Email not sent (mail relay failed)"),
            (Delivery::Sent, false) => Some("Email sent but message not stored"),
            (Delivery::Sent, true) => None,
        };
        Self {
            delivery: r.delivery,
            message_id: r.message_id,
            stored: r.stored,
            note,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub user: PublicUser,
    pub metrics: MessageStats,
}
