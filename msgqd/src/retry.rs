//! Retry-or-terminal-fail decision for a dispatch attempt. A
//! [`DispatchError`] that isn't retryable (`ChannelUnsupported`,
//! `Internal`) fails immediately; an `AdapterError` is retried up to
//! `max_retry_count` times by idempotent re-entry into the RETRY
//! priority, then fails terminally.

use msgq_queue::QueuePayload;
use msgq_store::{MessageStatus, Priority};

use crate::error::DispatchError;
use crate::state::SharedState;

pub async fn handle_failure(state: &SharedState, priority: Priority, payload: &QueuePayload, err: DispatchError) {
    let last_error = err.to_string();
    tracing::warn!(msg_id = %payload.msg_id, %last_error, "dispatch failed");

    if !err.is_retryable() {
        terminal_fail(state, priority, payload, &last_error).await;
        return;
    }

    // Best-effort: a failure to even record the retry count should not
    // by itself sink the message, so fall back to 0 (not yet maxed) and
    // let the next attempt's own increment eventually catch up.
    let retry_count = match msgq_store::message_record::increment_retry(state.store.pool(), payload.msg_id).await {
        Ok(n) => n,
        Err(err) => {
            tracing::error!(%err, msg_id = %payload.msg_id, "failed to increment retry_count");
            0
        }
    };

    if retry_count >= state.config.max_retry_count {
        terminal_fail(state, priority, payload, &last_error).await;
        return;
    }

    if let Err(err) = msgq_store::message_record::set_status(
        state.store.pool(),
        payload.msg_id,
        MessageStatus::Pending,
        Some(&last_error),
    )
    .await
    {
        tracing::error!(%err, msg_id = %payload.msg_id, "failed to record retry attempt");
    }

    // The row under the priority that just failed is superseded by the
    // RETRY-priority row created below; it stays around as a FAILED
    // record of that one attempt rather than being deleted.
    if let Some(table) = state.queue.as_table() {
        if let Err(err) = table.set_status(priority, payload.msg_id, MessageStatus::Failed).await {
            tracing::error!(%err, msg_id = %payload.msg_id, "failed to close out superseded queue row");
        }
    }

    if let Err(err) = state.queue.promote_to_retry(payload).await {
        tracing::error!(%err, msg_id = %payload.msg_id, "failed to promote message to retry, failing terminally");
        terminal_fail(state, priority, payload, &err.to_string()).await;
    }
}

async fn terminal_fail(state: &SharedState, priority: Priority, payload: &QueuePayload, last_error: &str) {
    if let Err(err) = msgq_store::message_record::set_status(
        state.store.pool(),
        payload.msg_id,
        MessageStatus::Failed,
        Some(last_error),
    )
    .await
    {
        tracing::error!(%err, msg_id = %payload.msg_id, "failed to record terminal failure");
    }
    if let Some(table) = state.queue.as_table() {
        if let Err(err) = table.set_status(priority, payload.msg_id, MessageStatus::Failed).await {
            tracing::error!(%err, msg_id = %payload.msg_id, "failed to mark queue entry failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_are_retried_others_are_not() {
        assert!(DispatchError::AdapterError("x".into()).is_retryable());
        assert!(!DispatchError::ChannelUnsupported.is_retryable());
        assert!(!DispatchError::Internal("x".into()).is_retryable());
    }
}
