//! Recipient expansion, shared by the ingress pipeline and the
//! scheduled-message engine: merge a direct address, user-id lookups
//! and tag lookups into one de-duplicated, order-preserving list of
//! channel-appropriate addresses.

use msgq_store::{Channel, Store};

/// Resolves `direct_to`, `user_ids` and `tags` into a de-duplicated list
/// of recipient addresses appropriate for `channel`, preserving
/// first-seen order across the three sources in that order.
pub async fn expand(
    store: &Store,
    direct_to: Option<&str>,
    user_ids: &[String],
    tags: &[String],
    channel: Channel,
) -> msgq_store::Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    if let Some(to) = direct_to {
        if !to.is_empty() && seen.insert(to.to_string()) {
            out.push(to.to_string());
        }
    }

    for user_id in user_ids {
        if let Some(user) = msgq_store::user::find_by_user_id(store.pool(), user_id).await? {
            if let Some(addr) = user.address_for(Some(channel)) {
                if seen.insert(addr.to_string()) {
                    out.push(addr.to_string());
                }
            }
        }
    }

    if !tags.is_empty() {
        let users = msgq_store::user::find_by_any_tags(store.pool(), tags).await?;
        for user in users {
            if let Some(addr) = user.address_for(Some(channel)) {
                if seen.insert(addr.to_string()) {
                    out.push(addr.to_string());
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    // Exercised indirectly through the ingress/scheduled integration
    // tests, which need a live `Store`; `address_for`'s fallback order is
    // unit-tested in `msgq_store::types`.
}
