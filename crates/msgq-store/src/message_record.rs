//! `message_record`: the durable audit trail for every message,
//! independent of which queue (or none, once terminal) currently holds
//! it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{MessageStatus, TemplateData};

pub async fn create(
    pool: &PgPool,
    msg_id: Uuid,
    to: &str,
    subject: Option<&str>,
    template_id: &str,
    template_data: &TemplateData,
    status: MessageStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO message_record
            (msg_id, "to", subject, template_id, template_data_json, status, retry_count, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, now(), now())
        "#,
    )
    .bind(msg_id)
    .bind(to)
    .bind(subject)
    .bind(template_id)
    .bind(sqlx::types::Json(template_data))
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, msg_id: Uuid) -> Result<crate::types::MessageRecord> {
    sqlx::query_as::<_, crate::types::MessageRecord>(
        r#"SELECT msg_id, "to", subject, template_id, template_data_json as template_data,
                  status, retry_count, last_error, created_at, updated_at
           FROM message_record WHERE msg_id = $1"#,
    )
    .bind(msg_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound)
}

pub async fn set_status(
    pool: &PgPool,
    msg_id: Uuid,
    status: MessageStatus,
    last_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE message_record SET status = $2, last_error = $3, updated_at = now()
           WHERE msg_id = $1"#,
    )
    .bind(msg_id)
    .bind(status)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Increments `retry_count` and returns the new value. Errors here are
/// deliberately non-fatal to the caller's retry decision — see the
/// retry engine, which logs and proceeds regardless.
pub async fn increment_retry(pool: &PgPool, msg_id: Uuid) -> Result<i32> {
    let row: (i32,) = sqlx::query_as(
        r#"UPDATE message_record SET retry_count = retry_count + 1, updated_at = now()
           WHERE msg_id = $1 RETURNING retry_count"#,
    )
    .bind(msg_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
