//! The wire/row shape a message takes while it travels through either
//! queue backend: enough to dispatch without going back to
//! `message_record` first.

use msgq_store::{QueueEntry, TemplateData};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    pub msg_id: Uuid,
    pub to: String,
    pub subject: Option<String>,
    pub template_id: String,
    pub template_data: TemplateData,
}

impl TryFrom<QueueEntry> for QueuePayload {
    type Error = serde_json::Error;

    fn try_from(e: QueueEntry) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            msg_id: e.msg_id,
            to: e.to,
            subject: e.subject,
            template_id: e.template_id,
            template_data: serde_json::from_value(e.template_data)?,
        })
    }
}
