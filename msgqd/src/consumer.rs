//! The consumer set: one task group per priority, dispatching whatever
//! [`crate::dispatcher`] claims off [`QueueHandle`].
//!
//! Table mode elects a single leader per priority via `msgq-lock` before
//! draining `message_queue`; broker mode fans each priority's Kafka
//! topic out across `fanout_weight` workers with no election needed
//! since Kafka's consumer group already partitions the work.

use std::time::Duration;

use msgq_queue::QueueHandle;
use msgq_server_lifecycle::{Activity, ShutdownSubscription};
use msgq_store::Priority;
use tokio::task::JoinHandle;

use crate::state::SharedState;

const PRIORITIES: [Priority; 4] = [Priority::High, Priority::Middle, Priority::Low, Priority::Retry];

/// Spawns the full consumer set for whichever queue mode `state` was
/// built with. Returns every task handle so `main` can track them, but
/// none of them return except on shutdown.
pub fn spawn_all(state: SharedState) -> Vec<JoinHandle<()>> {
    match &state.queue {
        QueueHandle::Table(_) => PRIORITIES
            .into_iter()
            .map(|priority| tokio::spawn(supervise_table_priority(state.clone(), priority)))
            .collect(),
        QueueHandle::Broker(broker) => {
            let mut handles = Vec::new();
            for priority in PRIORITIES {
                let weight = msgq_queue::fanout_weight(priority);
                let worker_state = state.clone();
                handles.extend(broker.spawn_consumers(priority, weight, move |payload| {
                    let state = worker_state.clone();
                    async move {
                        let _activity = Activity::get_opt("broker-dispatch");
                        let result = crate::dispatcher::dispatch(&state, &payload).await;
                        crate::dispatcher::handle_dispatch_result(&state, priority, &payload, result).await;
                    }
                }));
            }
            handles
        }
    }
}

/// Restarts `run_table_priority` after a 5s backoff if it panics. A
/// panic mid-drain drops whatever `LockGuard` it held; the guard's own
/// `Drop` stops the renewal watchdog, so the lease simply expires on
/// its TTL rather than being actively released — this loop only needs
/// to come back and try to acquire again once that happens.
async fn supervise_table_priority(state: SharedState, priority: Priority) {
    loop {
        if Activity::is_shutting_down() {
            return;
        }
        let task_state = state.clone();
        match tokio::spawn(async move { run_table_priority(task_state, priority).await }).await {
            Ok(()) => return,
            Err(join_err) => {
                tracing::error!(%join_err, ?priority, "priority consumer panicked, restarting in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn run_table_priority(state: SharedState, priority: Priority) {
    let lock_key = msgq_lock::priority_lock_key(priority.as_str());
    loop {
        if Activity::is_shutting_down() {
            return;
        }
        match msgq_lock::try_lock(state.redis.clone(), &lock_key, msgq_lock::DEFAULT_EXPIRE).await {
            Ok(Some(guard)) => {
                let _activity = Activity::get_opt(format!("drain:{}", priority.as_str()));
                drain_while_leader(&state, priority).await;
                if let Err(err) = guard.unlock().await {
                    tracing::warn!(%err, ?priority, "failed to release leader lock cleanly");
                }
            }
            Ok(None) => sleep_or_shutdown(msgq_lock::RETRY_INTERVAL).await,
            Err(err) => {
                tracing::error!(%err, ?priority, "failed to attempt leader lock");
                sleep_or_shutdown(msgq_lock::RETRY_INTERVAL).await;
            }
        }
    }
}

/// Runs claim-dispatch cycles for as long as this process is the
/// priority's leader, stopping the moment shutdown is signaled so a
/// long drain can't hold the process open indefinitely.
async fn drain_while_leader(state: &SharedState, priority: Priority) {
    let mut shutdown = ShutdownSubscription::get();
    loop {
        tokio::select! {
            _ = shutdown.shutting_down() => return,
            _ = drain_once(state, priority) => {}
        }
    }
}

async fn drain_once(state: &SharedState, priority: Priority) {
    let table = state.queue.as_table().expect("run_table_priority only runs in table mode");
    match table.batch_claim(priority, msgq_queue::batch_size(priority)).await {
        Ok(batch) => {
            for payload in batch {
                let result = crate::dispatcher::dispatch(state, &payload).await;
                crate::dispatcher::handle_dispatch_result(state, priority, &payload, result).await;
            }
        }
        Err(err) => tracing::error!(%err, ?priority, "failed to claim batch"),
    }
    tokio::time::sleep(msgq_queue::drain_jitter(priority)).await;
}

async fn sleep_or_shutdown(d: Duration) {
    let mut shutdown = ShutdownSubscription::get();
    tokio::select! {
        _ = shutdown.shutting_down() => {}
        _ = tokio::time::sleep(d) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_priority_once() {
        let mut seen: Vec<_> = PRIORITIES.to_vec();
        seen.sort_by_key(|p| *p as i32);
        assert_eq!(seen, vec![Priority::High, Priority::Middle, Priority::Low, Priority::Retry]);
    }
}
