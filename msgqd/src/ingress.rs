//! The ingress pipeline: validate → template load → recipient
//! expansion → (quota, rate-limit, persist, enqueue, record) per
//! recipient. Grounded step-for-step on
//! `original_source/src/ctrl/msg/send_msg.go`'s `HandleInput` /
//! `HandleProcess` / `sendSingleMessage`.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use msgq_queue::QueuePayload;
use msgq_store::{Channel, MessageStatus, Priority, TemplateData};
use msgq_throttle::{QuotaValue, RateLimitSpec};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngressError;
use crate::recipients;
use crate::state::SharedState;

/// The shape persisted into `message_timer_queue.req_json`: a resolved
/// [`QueuePayload`] plus the priority it was headed for, so
/// [`crate::timer`] can hand it straight to the queue backend once due
/// without re-running quota/rate-limit (those already happened at
/// submission time).
#[derive(Debug, Serialize, Deserialize)]
pub struct TimerEntry<P> {
    pub payload: P,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub source_id: String,
    pub template_id: String,
    pub template_data: TemplateData,
    pub to: Option<String>,
    pub user_ids: Vec<String>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    /// A future send time routes this request through the timer queue
    /// instead of an immediate priority enqueue.
    pub send_at: Option<DateTime<Utc>>,
}

impl SendRequest {
    fn validate(&self) -> Result<(), IngressError> {
        if self.template_id.is_empty() {
            return Err(IngressError::InputInvalid("template_id is required".into()));
        }
        if self.to.is_none() && self.user_ids.is_empty() && self.tags.is_empty() {
            return Err(IngressError::InputInvalid(
                "at least one of to, user_ids, tags is required".into(),
            ));
        }
        Ok(())
    }

    fn priority_or_default(&self) -> Priority {
        self.priority.unwrap_or(Priority::Low)
    }
}

#[derive(Debug, Clone)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub msg_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Runs the full pipeline for every expanded recipient independently,
/// capturing per-recipient errors rather than aborting the batch.
pub async fn submit_batch(
    state: &SharedState,
    req: &SendRequest,
) -> Result<Vec<RecipientOutcome>, IngressError> {
    req.validate()?;

    let template = template_ready(state, &req.template_id).await?;

    let recipients = recipients::expand(
        &state.store,
        req.to.as_deref(),
        &req.user_ids,
        &req.tags,
        template.channel,
    )
    .await
    .map_err(|err| IngressError::Internal(err.to_string()))?;

    if recipients.is_empty() {
        return Err(IngressError::InputInvalid("no valid recipients resolved".into()));
    }

    let mut outcomes = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let outcome = submit_one(state, req, &template, &recipient).await;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Convenience wrapper matching the source's single-id contract: the
/// first successfully submitted recipient's `msg_id`, or the first
/// error if none succeeded.
pub async fn submit(state: &SharedState, req: &SendRequest) -> Result<Uuid, IngressError> {
    let outcomes = submit_batch(state, req).await?;
    outcomes
        .iter()
        .find_map(|o| o.msg_id)
        .ok_or_else(|| match outcomes.first().and_then(|o| o.error.clone()) {
            Some(err) => IngressError::Internal(err),
            None => IngressError::Internal("all recipients failed".into()),
        })
}

async fn template_ready(state: &SharedState, template_id: &str) -> Result<msgq_store::Template, IngressError> {
    let template = msgq_store::template::get(state.store.pool(), template_id)
        .await
        .map_err(|_| IngressError::TemplateNotReady)?;
    if !matches!(template.status, msgq_store::TemplateStatus::Normal) {
        return Err(IngressError::TemplateNotReady);
    }
    Ok(template)
}

async fn submit_one(
    state: &SharedState,
    req: &SendRequest,
    template: &msgq_store::Template,
    recipient: &str,
) -> RecipientOutcome {
    match submit_one_inner(state, req, template, recipient).await {
        Ok(msg_id) => RecipientOutcome {
            recipient: recipient.to_string(),
            msg_id: Some(msg_id),
            error: None,
        },
        Err(err) => RecipientOutcome {
            recipient: recipient.to_string(),
            msg_id: None,
            error: Some(err.to_string()),
        },
    }
}

async fn submit_one_inner(
    state: &SharedState,
    req: &SendRequest,
    template: &msgq_store::Template,
    recipient: &str,
) -> Result<Uuid, IngressError> {
    let channel = template.channel;
    let quota = resolve_quota(state, &req.source_id, channel).await?;
    admit(&req.source_id, channel, req.send_at.is_some(), quota).await?;

    let msg_id = Uuid::new_v4();
    let persisted = persist_and_enqueue(state, req, template, recipient, msg_id).await;

    let status = if persisted.is_ok() {
        MessageStatus::Pending
    } else {
        MessageStatus::Failed
    };
    if let Err(err) = msgq_store::message_record::create(
        state.store.pool(),
        msg_id,
        recipient,
        template.subject.as_deref(),
        &req.template_id,
        &req.template_data,
        status,
    )
    .await
    {
        tracing::error!(%err, %msg_id, "failed to create message_record");
    }

    persisted.map(|_| msg_id)
}

async fn resolve_quota(state: &SharedState, source_id: &str, channel: Channel) -> Result<QuotaValue, IngressError> {
    if state.config.open_cache {
        if let Some(cached) = state.quota_cache.get(source_id, channel as i32) {
            return Ok(cached);
        }
    }

    let row = msgq_store::quota::resolve(state.store.pool(), source_id, channel as i32)
        .await
        .map_err(|err| IngressError::Internal(err.to_string()))?
        .ok_or_else(|| IngressError::Internal("no quota configured for channel".into()))?;

    let value = QuotaValue {
        limit: row.limit_count.max(0) as u64,
        window_seconds: row.window_seconds.max(0) as u64,
    };
    if state.config.open_cache {
        state.quota_cache.put(source_id, channel as i32, value);
    }
    Ok(value)
}

async fn admit(source_id: &str, channel: Channel, scheduled: bool, quota: QuotaValue) -> Result<(), IngressError> {
    let key = if scheduled {
        msgq_throttle::timer_key(source_id, channel as i32)
    } else {
        msgq_throttle::live_key(source_id, channel as i32)
    };
    let spec = RateLimitSpec {
        limit: quota.limit,
        window: Duration::from_secs(quota.window_seconds.max(1)),
        force_local: false,
    };
    let decision = msgq_throttle::admit(&key, spec, SystemTime::now())
        .await
        .map_err(|_| IngressError::RateLimited)?;
    if !decision.admitted {
        return Err(IngressError::RateLimited);
    }
    Ok(())
}

async fn persist_and_enqueue(
    state: &SharedState,
    req: &SendRequest,
    template: &msgq_store::Template,
    recipient: &str,
    msg_id: Uuid,
) -> Result<(), IngressError> {
    if let Some(send_at) = req.send_at {
        if send_at > Utc::now() {
            return persist_timer(state, req, template, recipient, msg_id, send_at).await;
        }
    }

    let payload = QueuePayload {
        msg_id,
        to: recipient.to_string(),
        subject: template.subject.clone(),
        template_id: req.template_id.clone(),
        template_data: req.template_data.clone(),
    };
    state
        .queue
        .enqueue(req.priority_or_default(), &payload)
        .await
        .map_err(|err| IngressError::EnqueueError(err.to_string()))
}

async fn persist_timer(
    state: &SharedState,
    req: &SendRequest,
    template: &msgq_store::Template,
    recipient: &str,
    msg_id: Uuid,
    send_at: DateTime<Utc>,
) -> Result<(), IngressError> {
    let payload = QueuePayload {
        msg_id,
        to: recipient.to_string(),
        subject: template.subject.clone(),
        template_id: req.template_id.clone(),
        template_data: req.template_data.clone(),
    };
    // The timer-queue row has to carry the requested priority alongside
    // the payload: by the time `crate::timer` fires this entry, the
    // caller's original `SendRequest` is long gone, and `QueuePayload`
    // itself has no priority field (it wouldn't make sense on a
    // broker-mode topic message, which already lives on one priority's
    // topic by construction).
    let stored = TimerEntry {
        payload: &payload,
        priority: req.priority_or_default(),
    };
    let req_json = serde_json::to_value(&stored).map_err(|err| IngressError::Internal(err.to_string()))?;

    msgq_store::timer_queue::enqueue(state.store.pool(), msg_id, send_at.timestamp(), &req_json)
        .await
        .map_err(|err| IngressError::PersistError(err.to_string()))?;

    let mut conn = state.redis.clone();
    let _: i64 = redis::cmd("ZADD")
        .arg("Timer_Msgs")
        .arg(send_at.timestamp())
        .arg(msg_id.to_string())
        .query_async(&mut conn)
        .await
        .map_err(|err| IngressError::PersistError(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SendRequest {
        SendRequest {
            source_id: "src-1".into(),
            template_id: "tmpl-1".into(),
            template_data: TemplateData::new(),
            to: Some("+15550001111".into()),
            user_ids: Vec::new(),
            tags: Vec::new(),
            priority: None,
            send_at: None,
        }
    }

    #[test]
    fn validate_rejects_empty_template_id() {
        let mut req = base_request();
        req.template_id = String::new();
        assert!(matches!(req.validate(), Err(IngressError::InputInvalid(_))));
    }

    #[test]
    fn validate_rejects_no_recipient_source() {
        let mut req = base_request();
        req.to = None;
        assert!(matches!(req.validate(), Err(IngressError::InputInvalid(_))));
    }

    #[test]
    fn validate_accepts_user_ids_without_direct_to() {
        let mut req = base_request();
        req.to = None;
        req.user_ids.push("user-1".into());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn priority_defaults_to_low() {
        let req = base_request();
        assert_eq!(req.priority_or_default(), Priority::Low);
    }

    #[test]
    fn priority_honors_explicit_choice() {
        let mut req = base_request();
        req.priority = Some(Priority::High);
        assert_eq!(req.priority_or_default(), Priority::High);
    }
}
