//! Turns a claimed [`QueuePayload`] into an adapter call: load the
//! template fresh (it may have been disabled since enqueue), render it
//! per channel, hand it to the registered adapter, and record the
//! outcome. Retry/terminal-failure handling lives in [`crate::retry`];
//! this module only classifies success vs. [`DispatchError`].

use msgq_queue::QueuePayload;
use msgq_store::{Channel, MessageStatus, Priority, Template};
use serde::Serialize;

use crate::error::DispatchError;
use crate::state::SharedState;

/// Loads the template, renders it for `channel`, resolves the adapter
/// and sends. Does not touch `message_record` or the table-mode queue
/// row — callers (the consumer loop, via [`crate::retry`]) own status
/// transitions since they also decide retry vs. terminal failure.
pub async fn dispatch(state: &SharedState, payload: &QueuePayload) -> Result<(), DispatchError> {
    let template = msgq_store::template::get(state.store.pool(), &payload.template_id)
        .await
        .map_err(|err| DispatchError::Internal(err.to_string()))?;

    if !matches!(template.status, msgq_store::TemplateStatus::Normal) {
        return Err(DispatchError::Internal("template disabled after enqueue".into()));
    }

    let adapter = state
        .adapters
        .get(template.channel)
        .ok_or(DispatchError::ChannelUnsupported)?;

    let (subject, content) = render_for_channel(&template, payload);

    adapter
        .send(&payload.to, subject.as_deref(), &content)
        .await
        .map_err(|err| DispatchError::AdapterError(err.to_string()))
}

/// EMAIL and CHAT get literal `{{name}}` substitution against the
/// template body only — the subject is passed through verbatim, exactly
/// as the template stores it (unsubstituted placeholders and all). CHAT
/// additionally logs whether the rendered body reads as a structured
/// card vs. plain text, since that changes how the chat adapter frames
/// the payload on its side. SMS forwards `template_data` and
/// `vendor_template_id` as-is — the vendor template owns substitution,
/// not us.
fn render_for_channel(template: &Template, payload: &QueuePayload) -> (Option<String>, String) {
    match template.channel {
        Channel::Email => {
            let subject = template.subject.clone();
            let body = msgq_channel::template::render(&template.content, &payload.template_data);
            (subject, body)
        }
        Channel::Chat => {
            let body = msgq_channel::template::render(&template.content, &payload.template_data);
            if msgq_channel::chat::is_structured_card(&body) {
                tracing::debug!(msg_id = %payload.msg_id, "chat content rendered as structured card");
            } else {
                tracing::debug!(msg_id = %payload.msg_id, "chat content rendered as plain text");
            }
            (None, body)
        }
        Channel::Sms => {
            #[derive(Serialize)]
            struct SmsContent<'a> {
                vendor_template_id: Option<&'a str>,
                data: &'a msgq_store::TemplateData,
            }
            let encoded = serde_json::to_string(&SmsContent {
                vendor_template_id: template.vendor_template_id.as_deref(),
                data: &payload.template_data,
            })
            .unwrap_or_default();
            (None, encoded)
        }
    }
}

/// Applies the terminal outcome of a dispatch attempt to the durable
/// record: SUCC for a clean send, otherwise delegates to
/// [`crate::retry::handle_failure`] for the retry-or-fail decision.
pub async fn handle_dispatch_result(
    state: &SharedState,
    priority: Priority,
    payload: &QueuePayload,
    result: Result<(), DispatchError>,
) {
    match result {
        Ok(()) => {
            if let Err(err) = msgq_store::message_record::set_status(
                state.store.pool(),
                payload.msg_id,
                MessageStatus::Succ,
                None,
            )
            .await
            {
                tracing::error!(%err, msg_id = %payload.msg_id, "failed to mark message_record succ");
            }
            if let Some(table) = state.queue.as_table() {
                if let Err(err) = table.set_status(priority, payload.msg_id, MessageStatus::Succ).await {
                    tracing::error!(%err, msg_id = %payload.msg_id, "failed to mark queue entry succ");
                }
            }
        }
        Err(err) => crate::retry::handle_failure(state, priority, payload, err).await,
    }
}
