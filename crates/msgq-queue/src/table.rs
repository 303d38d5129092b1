//! Table-mode queue backend: `message_queue` rows claimed under a
//! per-priority leader lock (the lock itself lives in the consumer set,
//! not here — this crate only knows how to read and write rows).

use msgq_store::{MessageStatus, Priority, Store};
use uuid::Uuid;

use crate::error::Result;
use crate::payload::QueuePayload;

#[derive(Clone)]
pub struct TableQueue {
    store: Store,
}

impl TableQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, priority: Priority, payload: &QueuePayload) -> Result<()> {
        msgq_store::message_queue::enqueue(
            self.store.pool(),
            priority,
            payload.msg_id,
            &payload.to,
            payload.subject.as_deref(),
            &payload.template_id,
            &payload.template_data,
        )
        .await?;
        crate::metrics::record_enqueue(priority);
        Ok(())
    }

    /// Idempotent re-entry into RETRY: an existing `(RETRY, msg_id)` row
    /// is reset to PENDING rather than duplicated.
    pub async fn promote_to_retry(&self, payload: &QueuePayload) -> Result<()> {
        msgq_store::message_queue::promote_to_retry(
            self.store.pool(),
            payload.msg_id,
            &payload.to,
            payload.subject.as_deref(),
            &payload.template_id,
            &payload.template_data,
        )
        .await?;
        Ok(())
    }

    /// Atomically flips up to `limit` PENDING rows for `priority` to
    /// PROCESSING and returns them. Only ever called by the leader.
    pub async fn batch_claim(&self, priority: Priority, limit: i64) -> Result<Vec<QueuePayload>> {
        let rows = msgq_store::message_queue::batch_claim(self.store.pool(), priority, limit).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match QueuePayload::try_from(row) {
                Ok(p) => out.push(p),
                Err(err) => tracing::error!(%err, "dropping unparseable message_queue row"),
            }
        }
        crate::metrics::record_claim(priority, out.len());
        Ok(out)
    }

    pub async fn set_status(&self, priority: Priority, msg_id: Uuid, status: MessageStatus) -> Result<()> {
        msgq_store::message_queue::set_status(self.store.pool(), priority, msg_id, status).await?;
        Ok(())
    }

    pub async fn find(&self, priority: Priority, msg_id: Uuid) -> Result<Option<QueuePayload>> {
        let row = msgq_store::message_queue::find(self.store.pool(), priority, msg_id).await?;
        Ok(match row {
            Some(row) => Some(QueuePayload::try_from(row).map_err(crate::error::Error::Serde)?),
            None => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn batch_size_per_priority_matches_spec() {
        assert_eq!(Priority::High.batch_size(), 60);
        assert_eq!(Priority::Middle.batch_size(), 30);
        assert_eq!(Priority::Low.batch_size(), 10);
        assert_eq!(Priority::Retry.batch_size(), 20);
    }
}
