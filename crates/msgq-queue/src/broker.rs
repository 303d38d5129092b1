//! Broker-mode queue backend: each priority is its own Kafka topic.
//! Delivery is at-least-once — the offset is committed only after the
//! handler has returned, so a crash mid-handler causes redelivery, not
//! loss.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use msgq_server_lifecycle::ShutdownSubscription;
use msgq_store::Priority;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::payload::QueuePayload;

fn topic(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "msgq.high",
        Priority::Middle => "msgq.middle",
        Priority::Low => "msgq.low",
        Priority::Retry => "msgq.retry",
    }
}

/// Per-priority worker fan-out weight, statically biasing throughput
/// toward higher priorities: HIGH:MIDDLE:LOW:RETRY = 6:3:1:1.
pub fn fanout_weight(priority: Priority) -> usize {
    match priority {
        Priority::High => 6,
        Priority::Middle => 3,
        Priority::Low => 1,
        Priority::Retry => 1,
    }
}

pub struct BrokerQueue {
    producer: FutureProducer,
    bootstrap_servers: String,
    group_id: String,
}

impl BrokerQueue {
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self {
            producer,
            bootstrap_servers: bootstrap_servers.to_string(),
            group_id: group_id.to_string(),
        })
    }

    pub async fn enqueue(&self, priority: Priority, payload: &QueuePayload) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        let key = payload.msg_id.to_string();
        self.producer
            .send(
                FutureRecord::to(topic(priority)).payload(&body).key(&key),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(err, _)| Error::Kafka(err))?;
        crate::metrics::record_enqueue(priority);
        Ok(())
    }

    /// Publishing to RETRY is itself the idempotent re-entry path in
    /// broker mode: there is no row to reset, only a new message with
    /// the same `msg_id` in its payload.
    pub async fn promote_to_retry(&self, payload: &QueuePayload) -> Result<()> {
        self.enqueue(Priority::Retry, payload).await
    }

    fn consumer(&self) -> Result<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        Ok(consumer)
    }

    /// Spawns `weight` independent consumer tasks subscribed to
    /// `priority`'s topic, each invoking `handler` per delivered message
    /// and committing only once the handler completes.
    pub fn spawn_consumers<F, Fut>(
        self: &Arc<Self>,
        priority: Priority,
        weight: usize,
        handler: F,
    ) -> Vec<JoinHandle<()>>
    where
        F: Fn(QueuePayload) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        (0..weight)
            .map(|worker_idx| {
                let this = self.clone();
                let handler = handler.clone();
                tokio::spawn(async move { this.consume_loop(priority, worker_idx, handler).await })
            })
            .collect()
    }

    async fn consume_loop<F, Fut>(&self, priority: Priority, worker_idx: usize, handler: F)
    where
        F: Fn(QueuePayload) -> Fut,
        Fut: Future<Output = ()>,
    {
        let consumer = match self.consumer() {
            Ok(c) => c,
            Err(err) => {
                tracing::error!(%err, ?priority, worker_idx, "failed to create kafka consumer");
                return;
            }
        };
        if let Err(err) = consumer.subscribe(&[topic(priority)]) {
            tracing::error!(%err, ?priority, worker_idx, "failed to subscribe to topic");
            return;
        }

        let mut shutdown = ShutdownSubscription::get();
        loop {
            tokio::select! {
                _ = shutdown.shutting_down() => {
                    tracing::debug!(?priority, worker_idx, "broker consumer stopping for shutdown");
                    return;
                }
                received = consumer.recv() => {
                    match received {
                        Ok(msg) => {
                            if let Some(bytes) = msg.payload() {
                                match serde_json::from_slice::<QueuePayload>(bytes) {
                                    Ok(payload) => {
                                        crate::metrics::record_claim(priority, 1);
                                        handler(payload).await;
                                    }
                                    Err(err) => tracing::error!(%err, ?priority, "dropping malformed kafka payload"),
                                }
                            }
                            if let Err(err) = consumer.commit_message(&msg, CommitMode::Async) {
                                tracing::warn!(%err, ?priority, "failed to commit kafka offset");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(%err, ?priority, "kafka recv error, backing off");
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn topics_are_one_per_priority() {
        assert_eq!(topic(Priority::High), "msgq.high");
        assert_eq!(topic(Priority::Retry), "msgq.retry");
    }

    #[test]
    fn fanout_weights_match_spec_ratio() {
        assert_eq!(fanout_weight(Priority::High), 6);
        assert_eq!(fanout_weight(Priority::Middle), 3);
        assert_eq!(fanout_weight(Priority::Low), 1);
        assert_eq!(fanout_weight(Priority::Retry), 1);
    }
}
