//! `source_quota` / `global_quota`: the two quota tiers the rate
//! limiter's cache falls through — a tenant-specific override first,
//! then the channel-wide default.

use sqlx::PgPool;

use crate::error::Result;
use crate::types::QuotaRow;

pub async fn tenant_override(
    pool: &PgPool,
    source_id: &str,
    channel: i32,
) -> Result<Option<QuotaRow>> {
    let row = sqlx::query_as::<_, QuotaRow>(
        r#"SELECT limit_count, window_seconds FROM source_quota
           WHERE source_id = $1 AND channel = $2"#,
    )
    .bind(source_id)
    .bind(channel)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn global_default(pool: &PgPool, channel: i32) -> Result<Option<QuotaRow>> {
    let row = sqlx::query_as::<_, QuotaRow>(
        r#"SELECT limit_count, window_seconds FROM global_quota WHERE channel = $1"#,
    )
    .bind(channel)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Resolves a quota for `(source_id, channel)`: tenant override first,
/// falling back to the global default for the channel.
pub async fn resolve(pool: &PgPool, source_id: &str, channel: i32) -> Result<Option<QuotaRow>> {
    if let Some(row) = tenant_override(pool, source_id, channel).await? {
        return Ok(Some(row));
    }
    global_default(pool, channel).await
}
