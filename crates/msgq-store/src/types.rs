//! Domain types shared by every table in the repository layer.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `template_data`: an ordered map so that vendor-facing payloads (eg.
/// the SMS adapter, which forwards this verbatim) preserve the caller's
/// key order rather than randomizing it.
pub type TemplateData = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum Priority {
    High = 1,
    Middle = 2,
    Low = 3,
    Retry = 4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Middle => "MIDDLE",
            Priority::Low => "LOW",
            Priority::Retry => "RETRY",
        }
    }

    pub fn all() -> [Priority; 4] {
        [Priority::High, Priority::Middle, Priority::Low, Priority::Retry]
    }

    /// Batch size a table-mode leader claims per drain cycle.
    pub fn batch_size(&self) -> i64 {
        match self {
            Priority::High => 60,
            Priority::Middle => 30,
            Priority::Low => 10,
            Priority::Retry => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum Channel {
    Email = 1,
    Sms = 2,
    Chat = 3,
}

impl Channel {
    pub fn from_i32(v: i32) -> Option<Channel> {
        match v {
            1 => Some(Channel::Email),
            2 => Some(Channel::Sms),
            3 => Some(Channel::Chat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum MessageStatus {
    Pending = 1,
    Processing = 2,
    Succ = 3,
    Failed = 4,
}

/// `Claimed` is an addition over the original system's plain `Sent`
/// flag: it marks "removed from the due-time index, fan-out in
/// progress" distinctly from `Sent` ("every recipient has been handed
/// to ingress").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum ScheduledStatus {
    Pending = 1,
    Sent = 2,
    Cancelled = 3,
    Failed = 4,
    Claimed = 5,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRecord {
    pub msg_id: Uuid,
    pub to: String,
    pub subject: Option<String>,
    pub template_id: String,
    #[sqlx(json)]
    pub template_data: serde_json::Value,
    pub status: MessageStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueEntry {
    pub id: i64,
    pub priority: Priority,
    pub msg_id: Uuid,
    pub to: String,
    pub subject: Option<String>,
    pub template_id: String,
    #[sqlx(json)]
    pub template_data: serde_json::Value,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TimerQueueEntry {
    pub id: i64,
    pub msg_id: Uuid,
    pub send_at_unix: i64,
    #[sqlx(json)]
    pub req: serde_json::Value,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Template {
    pub template_id: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub content: String,
    pub source_id: String,
    pub vendor_template_id: Option<String>,
    pub status: TemplateStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum TemplateStatus {
    Normal = 1,
    Disabled = 2,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub chat_id: Option<String>,
    #[sqlx(json)]
    pub tags: serde_json::Value,
    pub status: i32,
}

impl User {
    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }

    /// Channel-aware address pick. A specified channel returns exactly
    /// that channel's address, or `None` if the user has none on file;
    /// it does not fall through to another channel. Only an unspecified
    /// channel falls back email -> mobile -> chat.
    pub fn address_for(&self, channel: Option<Channel>) -> Option<&str> {
        match channel {
            Some(Channel::Email) => self.email.as_deref(),
            Some(Channel::Sms) => self.mobile.as_deref(),
            Some(Channel::Chat) => self.chat_id.as_deref(),
            None => self
                .email
                .as_deref()
                .or(self.mobile.as_deref())
                .or(self.chat_id.as_deref()),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledEntry {
    pub schedule_id: String,
    #[sqlx(json)]
    pub user_ids: serde_json::Value,
    #[sqlx(json)]
    pub tags: serde_json::Value,
    pub direct_to: Option<String>,
    pub template_id: String,
    #[sqlx(json)]
    pub template_data: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub actual_send_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledEntry {
    pub fn user_ids_vec(&self) -> Vec<String> {
        serde_json::from_value(self.user_ids.clone()).unwrap_or_default()
    }

    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct QuotaRow {
    pub limit_count: i64,
    pub window_seconds: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    fn user(email: &str, mobile: &str, chat: &str) -> User {
        User {
            user_id: "u1".into(),
            name: "test".into(),
            mobile: if mobile.is_empty() { None } else { Some(mobile.into()) },
            email: if email.is_empty() { None } else { Some(email.into()) },
            chat_id: if chat.is_empty() { None } else { Some(chat.into()) },
            tags: serde_json::json!([]),
            status: 1,
        }
    }

    #[test]
    fn address_for_prefers_requested_channel() {
        let u = user("a@x.com", "555", "chat1");
        assert_eq!(u.address_for(Some(Channel::Sms)), Some("555"));
        assert_eq!(u.address_for(Some(Channel::Email)), Some("a@x.com"));
    }

    #[test]
    fn address_for_falls_back_email_then_mobile_then_chat_only_when_unspecified() {
        let u = user("", "", "chat1");
        assert_eq!(u.address_for(None), Some("chat1"));

        let u = user("", "", "");
        assert_eq!(u.address_for(None), None);
    }

    #[test]
    fn address_for_does_not_fall_back_to_another_channel_when_specified() {
        let u = user("", "555", "chat1");
        assert_eq!(u.address_for(Some(Channel::Email)), None, "no email on file, must not fall back to mobile");
        assert_eq!(u.address_for(Some(Channel::Sms)), Some("555"));
    }

    #[test]
    fn template_data_preserves_insertion_order() {
        let mut data = TemplateData::new();
        data.insert("zeta".to_string(), "1".to_string());
        data.insert("alpha".to_string(), "2".to_string());
        let keys: Vec<&str> = data.keys().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
