//! `scheduled_message`: tag/user-id targeted sends with a future
//! `scheduled_at`, promoted by the scheduled-message engine once due.
//! This is a distinct mechanism from `timer_queue`'s direct-recipient
//! "send later" path.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::types::{ScheduledEntry, ScheduledStatus};

#[derive(Debug, Clone)]
pub struct NewScheduledEntry<'a> {
    pub schedule_id: &'a str,
    pub user_ids: &'a [String],
    pub tags: &'a [String],
    pub direct_to: Option<&'a str>,
    pub template_id: &'a str,
    pub template_data: &'a serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
}

pub async fn create(pool: &PgPool, entry: NewScheduledEntry<'_>) -> Result<()> {
    let existing = get(pool, entry.schedule_id).await;
    if existing.is_ok() {
        return Err(Error::DuplicateScheduleId);
    }

    sqlx::query(
        r#"
        INSERT INTO scheduled_message
            (schedule_id, user_ids_json, tags_json, direct_to, template_id,
             template_data_json, scheduled_at, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
        "#,
    )
    .bind(entry.schedule_id)
    .bind(sqlx::types::Json(entry.user_ids))
    .bind(sqlx::types::Json(entry.tags))
    .bind(entry.direct_to)
    .bind(entry.template_id)
    .bind(sqlx::types::Json(entry.template_data))
    .bind(entry.scheduled_at)
    .bind(ScheduledStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, schedule_id: &str) -> Result<ScheduledEntry> {
    sqlx::query_as::<_, ScheduledEntry>(
        r#"SELECT schedule_id, user_ids_json as user_ids, tags_json as tags, direct_to,
                  template_id, template_data_json as template_data, scheduled_at, status,
                  actual_send_at, created_at
           FROM scheduled_message WHERE schedule_id = $1"#,
    )
    .bind(schedule_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound)
}

pub async fn list(
    pool: &PgPool,
    status: Option<ScheduledStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScheduledEntry>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, ScheduledEntry>(
                r#"SELECT schedule_id, user_ids_json as user_ids, tags_json as tags, direct_to,
                          template_id, template_data_json as template_data, scheduled_at, status,
                          actual_send_at, created_at
                   FROM scheduled_message WHERE status = $1
                   ORDER BY scheduled_at LIMIT $2 OFFSET $3"#,
            )
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ScheduledEntry>(
                r#"SELECT schedule_id, user_ids_json as user_ids, tags_json as tags, direct_to,
                          template_id, template_data_json as template_data, scheduled_at, status,
                          actual_send_at, created_at
                   FROM scheduled_message
                   ORDER BY scheduled_at LIMIT $1 OFFSET $2"#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Idempotent: cancelling an already-cancelled entry is a no-op success.
pub async fn cancel(pool: &PgPool, schedule_id: &str) -> Result<()> {
    sqlx::query(
        r#"UPDATE scheduled_message SET status = $2
           WHERE schedule_id = $1 AND status = $3"#,
    )
    .bind(schedule_id)
    .bind(ScheduledStatus::Cancelled)
    .bind(ScheduledStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, schedule_id: &str, status: ScheduledStatus) -> Result<()> {
    sqlx::query(r#"UPDATE scheduled_message SET status = $2 WHERE schedule_id = $1"#)
        .bind(schedule_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_sent(pool: &PgPool, schedule_id: &str, actual_send_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"UPDATE scheduled_message SET status = $2, actual_send_at = $3 WHERE schedule_id = $1"#,
    )
    .bind(schedule_id)
    .bind(ScheduledStatus::Sent)
    .bind(actual_send_at)
    .execute(pool)
    .await?;
    Ok(())
}
