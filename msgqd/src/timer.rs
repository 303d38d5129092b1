//! The immediate-API's "send later" engine: fires `message_timer_queue`
//! rows once their `send_at_unix` has passed, handing the already-
//! resolved payload straight to the priority queue. Distinct from
//! [`crate::scheduled`]'s tag/user-targeted engine — by the time a
//! request reaches here it was already fully resolved to one recipient
//! and passed quota/rate-limit at submission time, so firing a due
//! entry is a plain enqueue, not a re-run of the ingress pipeline.

use std::time::Duration;

use msgq_queue::QueuePayload;
use msgq_server_lifecycle::{Activity, ShutdownSubscription};
use msgq_store::MessageStatus;

use crate::ingress::TimerEntry;
use crate::state::SharedState;

const INDEX_KEY: &str = "Timer_Msgs";
const TICK: Duration = Duration::from_secs(10);

/// Runs forever, waking every [`TICK`] to fire due entries, until
/// shutdown is signaled.
pub async fn run(state: SharedState) {
    let mut shutdown = ShutdownSubscription::get();
    loop {
        tokio::select! {
            _ = shutdown.shutting_down() => return,
            _ = tokio::time::sleep(TICK) => {}
        }
        let _activity = Activity::get_opt("timer-tick");
        if let Err(err) = fire_due(&state).await {
            tracing::error!(%err, "timer-queue tick failed");
        }
    }
}

async fn fire_due(state: &SharedState) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut conn = state.redis.clone();
    let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
        .arg(INDEX_KEY)
        .arg("-inf")
        .arg(now)
        .query_async(&mut conn)
        .await?;

    for msg_id in due {
        // Removing from the index first means a slow fire (or a tick
        // overlapping a crash-restart) can't double-claim the same row.
        let removed: i64 = redis::cmd("ZREM")
            .arg(INDEX_KEY)
            .arg(&msg_id)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            continue;
        }
        if let Err(err) = fire_one(state, &msg_id).await {
            tracing::error!(%err, %msg_id, "failed to fire timer-queue entry");
        }
    }
    Ok(())
}

async fn fire_one(state: &SharedState, msg_id: &str) -> anyhow::Result<()> {
    let msg_id: uuid::Uuid = msg_id.parse()?;
    let row = msgq_store::timer_queue::get(state.store.pool(), msg_id).await?;
    if row.status != MessageStatus::Pending {
        // Already fired or failed by a previous tick.
        return Ok(());
    }

    let entry: TimerEntry<QueuePayload> = match serde_json::from_value(row.req.clone()) {
        Ok(entry) => entry,
        Err(err) => {
            msgq_store::timer_queue::set_status(state.store.pool(), msg_id, MessageStatus::Failed).await?;
            return Err(err.into());
        }
    };

    match state.queue.enqueue(entry.priority, &entry.payload).await {
        Ok(()) => {
            msgq_store::timer_queue::set_status(state.store.pool(), msg_id, MessageStatus::Succ).await?;
            Ok(())
        }
        Err(err) => {
            msgq_store::timer_queue::set_status(state.store.pool(), msg_id, MessageStatus::Failed).await?;
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
