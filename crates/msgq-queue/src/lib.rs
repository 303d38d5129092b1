//! Polymorphic queue backend: the four logical priority queues (HIGH,
//! MIDDLE, LOW, RETRY), backed by either a Kafka topic per priority
//! (broker mode) or `message_queue` rows claimed under a leader lock
//! (table mode). See [`QueueHandle`] for the mode-erased seam everything
//! above this crate talks to.

pub mod backend;
pub mod broker;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod table;

pub use backend::{batch_size, drain_jitter, QueueHandle};
pub use broker::{fanout_weight, BrokerQueue};
pub use error::{Error, Result};
pub use payload::QueuePayload;
pub use table::TableQueue;
