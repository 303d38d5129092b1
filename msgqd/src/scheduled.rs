//! The scheduled-message engine: CRUD over `scheduled_message`, plus a
//! recurring tick that fires entries whose `scheduled_at` has passed.
//! Distinct from the ingress pipeline's own timer queue (`Timer_Msgs`):
//! this path targets user-ids/tags rather than a single resolved
//! recipient, and is indexed by its own Redis sorted set,
//! `Scheduled_Messages`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use msgq_server_lifecycle::{Activity, ShutdownSubscription};
use msgq_store::{NewScheduledEntry, ScheduledEntry, ScheduledStatus, TemplateData};

use crate::error::IngressError;
use crate::ingress::{submit_batch, SendRequest};
use crate::state::SharedState;

const INDEX_KEY: &str = "Scheduled_Messages";
const TICK: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("scheduled_at must be in the future")]
    PastScheduledAt,
    #[error(transparent)]
    Store(#[from] msgq_store::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub async fn create(
    state: &SharedState,
    schedule_id: &str,
    user_ids: &[String],
    tags: &[String],
    direct_to: Option<&str>,
    template_id: &str,
    template_data: &TemplateData,
    scheduled_at: DateTime<Utc>,
) -> Result<(), ScheduleError> {
    if scheduled_at <= Utc::now() {
        return Err(ScheduleError::PastScheduledAt);
    }

    let data_json = serde_json::to_value(template_data).unwrap_or(serde_json::Value::Null);
    msgq_store::scheduled::create(
        state.store.pool(),
        NewScheduledEntry {
            schedule_id,
            user_ids,
            tags,
            direct_to,
            template_id,
            template_data: &data_json,
            scheduled_at,
        },
    )
    .await?;

    let mut conn = state.redis.clone();
    let _: i64 = redis::cmd("ZADD")
        .arg(INDEX_KEY)
        .arg(scheduled_at.timestamp())
        .arg(schedule_id)
        .query_async(&mut conn)
        .await?;
    Ok(())
}

pub async fn get(state: &SharedState, schedule_id: &str) -> Result<ScheduledEntry, ScheduleError> {
    Ok(msgq_store::scheduled::get(state.store.pool(), schedule_id).await?)
}

pub async fn list(
    state: &SharedState,
    status: Option<ScheduledStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScheduledEntry>, ScheduleError> {
    Ok(msgq_store::scheduled::list(state.store.pool(), status, limit, offset).await?)
}

/// Idempotent: cancelling an already-terminal entry is a no-op success,
/// matching `msgq_store::scheduled::cancel`.
pub async fn cancel(state: &SharedState, schedule_id: &str) -> Result<(), ScheduleError> {
    msgq_store::scheduled::cancel(state.store.pool(), schedule_id).await?;
    let mut conn = state.redis.clone();
    let _: i64 = redis::cmd("ZREM")
        .arg(INDEX_KEY)
        .arg(schedule_id)
        .query_async(&mut conn)
        .await?;
    Ok(())
}

/// Runs forever, waking every [`TICK`] to fire due entries, until
/// shutdown is signaled.
pub async fn run(state: SharedState) {
    let mut shutdown = ShutdownSubscription::get();
    loop {
        tokio::select! {
            _ = shutdown.shutting_down() => return,
            _ = tokio::time::sleep(TICK) => {}
        }
        let _activity = Activity::get_opt("scheduled-tick");
        if let Err(err) = fire_due(&state).await {
            tracing::error!(%err, "scheduled-message tick failed");
        }
    }
}

async fn fire_due(state: &SharedState) -> anyhow::Result<()> {
    let now = Utc::now().timestamp();
    let mut conn = state.redis.clone();
    let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
        .arg(INDEX_KEY)
        .arg("-inf")
        .arg(now)
        .query_async(&mut conn)
        .await?;

    for schedule_id in due {
        // Remove from the index before processing so a slow fire (or a
        // tick overlapping a crash-restart) can't double-claim the same
        // entry; this is the PENDING -> CLAIMED transition.
        let removed: i64 = redis::cmd("ZREM")
            .arg(INDEX_KEY)
            .arg(&schedule_id)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            continue;
        }
        if let Err(err) = fire_one(state, &schedule_id).await {
            tracing::error!(%err, %schedule_id, "failed to fire scheduled message");
        }
    }
    Ok(())
}

async fn fire_one(state: &SharedState, schedule_id: &str) -> anyhow::Result<()> {
    let entry = msgq_store::scheduled::get(state.store.pool(), schedule_id).await?;
    if entry.status != ScheduledStatus::Pending {
        // Already claimed/sent/cancelled by a previous tick; the index
        // entry is already gone, nothing further to do.
        return Ok(());
    }
    msgq_store::scheduled::set_status(state.store.pool(), schedule_id, ScheduledStatus::Claimed).await?;

    let user_ids: Vec<String> = serde_json::from_value(entry.user_ids.clone())?;
    let tags: Vec<String> = serde_json::from_value(entry.tags.clone())?;
    let template_data: TemplateData = match serde_json::from_value(entry.template_data.clone()) {
        Ok(data) => data,
        Err(err) => {
            msgq_store::scheduled::set_status(state.store.pool(), schedule_id, ScheduledStatus::Failed).await?;
            return Err(err.into());
        }
    };

    let req = SendRequest {
        // Scheduled sends have no single tenant, so quota resolution
        // falls through straight to the channel's global default.
        // `send_at: Some(now)` is not a future time — it does not route
        // through the timer queue — but it does select the `timer`
        // rate-limit counter namespace, the one piece of per-request
        // admission this path keeps so a backlog of due entries can't
        // starve the shared limiter budget.
        source_id: format!("schedule:{schedule_id}"),
        template_id: entry.template_id.clone(),
        template_data,
        to: entry.direct_to.clone(),
        user_ids,
        tags,
        priority: Some(msgq_store::Priority::Middle),
        send_at: Some(Utc::now()),
    };

    match submit_batch(state, &req).await {
        Ok(outcomes) => {
            let failed: Vec<_> = outcomes.iter().filter(|o| o.error.is_some()).collect();
            if failed.is_empty() || failed.len() < outcomes.len() {
                msgq_store::scheduled::mark_sent(state.store.pool(), schedule_id, Utc::now()).await?;
            } else {
                msgq_store::scheduled::set_status(state.store.pool(), schedule_id, ScheduledStatus::Failed).await?;
            }
            Ok(())
        }
        Err(IngressError::TemplateNotReady) => {
            msgq_store::scheduled::set_status(state.store.pool(), schedule_id, ScheduledStatus::Failed).await?;
            Ok(())
        }
        Err(err) => {
            msgq_store::scheduled::set_status(state.store.pool(), schedule_id, ScheduledStatus::Failed).await?;
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_is_ten_seconds() {
        assert_eq!(TICK, Duration::from_secs(10));
    }
}
