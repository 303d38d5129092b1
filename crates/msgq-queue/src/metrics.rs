//! Prometheus counters for the queue backend, in the same
//! `LazyLock<IntCounterVec>` + `register_*!` style the teacher uses
//! throughout `kumod` (see eg. `dns-resolver/src/lib.rs`'s `MX_SUCCESS`/
//! `MX_FAIL` pair). Labeled by priority so HIGH/MIDDLE/LOW/RETRY
//! throughput can be told apart on one dashboard.

use std::sync::LazyLock;

use msgq_store::Priority;
use prometheus::IntCounterVec;

static ENQUEUED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    prometheus::register_int_counter_vec!(
        "msgq_enqueued_total",
        "total number of messages enqueued per priority",
        &["priority"]
    )
    .unwrap()
});

static CLAIMED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    prometheus::register_int_counter_vec!(
        "msgq_claimed_total",
        "total number of messages claimed off a priority by its leader or consumer",
        &["priority"]
    )
    .unwrap()
});

pub fn record_enqueue(priority: Priority) {
    ENQUEUED.with_label_values(&[priority.as_str()]).inc();
}

pub fn record_claim(priority: Priority, count: usize) {
    if count > 0 {
        CLAIMED.with_label_values(&[priority.as_str()]).inc_by(count as u64);
    }
}
