//! `message_queue`: the table-mode backing store for the four priority
//! queues. Claiming a batch and marking it `PROCESSING` is one atomic
//! statement so that only the leader for a priority ever sees a given
//! row as claimed.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{MessageStatus, Priority, QueueEntry, TemplateData};

pub async fn enqueue(
    pool: &PgPool,
    priority: Priority,
    msg_id: Uuid,
    to: &str,
    subject: Option<&str>,
    template_id: &str,
    template_data: &TemplateData,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO message_queue
            (priority, msg_id, "to", subject, template_id, template_data_json, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        ON CONFLICT (priority, msg_id) DO UPDATE
            SET status = excluded.status, created_at = now()
        "#,
    )
    .bind(priority)
    .bind(msg_id)
    .bind(to)
    .bind(subject)
    .bind(template_id)
    .bind(sqlx::types::Json(template_data))
    .bind(MessageStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

/// Claims up to `limit` `PENDING` entries for `priority`, flipping them
/// to `PROCESSING` and returning them, skipping any row another
/// connection already has locked. Only ever called by the leader.
pub async fn batch_claim(pool: &PgPool, priority: Priority, limit: i64) -> Result<Vec<QueueEntry>> {
    let rows = sqlx::query_as::<_, QueueEntry>(
        r#"
        UPDATE message_queue
        SET status = $3
        WHERE id IN (
            SELECT id FROM message_queue
            WHERE priority = $1 AND status = $4
            ORDER BY created_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, priority, msg_id, "to", subject, template_id,
                  template_data_json as template_data, status, created_at
        "#,
    )
    .bind(priority)
    .bind(limit)
    .bind(MessageStatus::Processing)
    .bind(MessageStatus::Pending)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_status(
    pool: &PgPool,
    priority: Priority,
    msg_id: Uuid,
    status: MessageStatus,
) -> Result<()> {
    sqlx::query(r#"UPDATE message_queue SET status = $3 WHERE priority = $1 AND msg_id = $2"#)
        .bind(priority)
        .bind(msg_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find(pool: &PgPool, priority: Priority, msg_id: Uuid) -> Result<Option<QueueEntry>> {
    let row = sqlx::query_as::<_, QueueEntry>(
        r#"SELECT id, priority, msg_id, "to", subject, template_id,
                  template_data_json as template_data, status, created_at
           FROM message_queue WHERE priority = $1 AND msg_id = $2"#,
    )
    .bind(priority)
    .bind(msg_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Moves `msg_id` into the `RETRY` priority. If a `(RETRY, msg_id)` row
/// already exists (a previous retry cycle for the same message), it is
/// reset to `PENDING` rather than duplicated — re-entry is idempotent.
pub async fn promote_to_retry(
    pool: &PgPool,
    msg_id: Uuid,
    to: &str,
    subject: Option<&str>,
    template_id: &str,
    template_data: &TemplateData,
) -> Result<()> {
    enqueue(pool, Priority::Retry, msg_id, to, subject, template_id, template_data).await
}
