//! The single switch point between broker mode and table mode. The
//! mode is decided once at process startup (from `mysql_as_mq` in
//! config); everything downstream of [`QueueHandle`] — the consumer
//! set, the retry engine — holds whichever variant it was built with
//! and never branches on mode again.

use std::sync::Arc;
use std::time::Duration;

use msgq_store::Priority;
use rand::Rng;

use crate::broker::BrokerQueue;
use crate::error::Result;
use crate::payload::QueuePayload;
use crate::table::TableQueue;

#[derive(Clone)]
pub enum QueueHandle {
    Table(TableQueue),
    Broker(Arc<BrokerQueue>),
}

impl QueueHandle {
    pub async fn enqueue(&self, priority: Priority, payload: &QueuePayload) -> Result<()> {
        match self {
            QueueHandle::Table(t) => t.enqueue(priority, payload).await,
            QueueHandle::Broker(b) => b.enqueue(priority, payload).await,
        }
    }

    pub async fn promote_to_retry(&self, payload: &QueuePayload) -> Result<()> {
        match self {
            QueueHandle::Table(t) => t.promote_to_retry(payload).await,
            QueueHandle::Broker(b) => b.promote_to_retry(payload).await,
        }
    }

    pub fn as_table(&self) -> Option<&TableQueue> {
        match self {
            QueueHandle::Table(t) => Some(t),
            QueueHandle::Broker(_) => None,
        }
    }

    pub fn as_broker(&self) -> Option<&Arc<BrokerQueue>> {
        match self {
            QueueHandle::Table(_) => None,
            QueueHandle::Broker(b) => Some(b),
        }
    }
}

/// Table-mode's marker type for mutations that don't belong on the
/// shared enum (`batch_claim`/`set_status`/`find` only make sense when
/// there's a row to act on).
pub use crate::table::TableQueue as TableBackend;

/// Inter-cycle sleep for a table-mode drain loop: RETRY backs off
/// longer than the other three so a run of transient adapter failures
/// doesn't spin the leader hot against the database.
pub fn drain_jitter(priority: Priority) -> Duration {
    let mut rng = rand::thread_rng();
    match priority {
        Priority::Retry => Duration::from_millis(rng.gen_range(1000..=2000)),
        _ => Duration::from_millis(rng.gen_range(0..=500)),
    }
}

pub fn batch_size(priority: Priority) -> i64 {
    priority.batch_size()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drain_jitter_retry_is_longer_than_others() {
        for _ in 0..50 {
            let retry = drain_jitter(Priority::Retry);
            let high = drain_jitter(Priority::High);
            assert!(retry >= Duration::from_millis(1000));
            assert!(retry <= Duration::from_millis(2000));
            assert!(high <= Duration::from_millis(500));
        }
    }
}
