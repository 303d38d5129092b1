//! `message_timer_queue`: the immediate-API's "send later" path (a send
//! request with a future `send_at`, expanded already into a concrete
//! recipient), distinct from the tag/user-targeted scheduled-message
//! engine in `scheduled.rs`. Both use their own time-indexed sorted set
//! (`Timer_Msgs` vs `Scheduled_Messages`).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{MessageStatus, TimerQueueEntry};

pub async fn enqueue(
    pool: &PgPool,
    msg_id: Uuid,
    send_at_unix: i64,
    req: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO message_timer_queue (msg_id, send_at_unix, req_json, status, created_at)
           VALUES ($1, $2, $3, $4, now())"#,
    )
    .bind(msg_id)
    .bind(send_at_unix)
    .bind(sqlx::types::Json(req))
    .bind(MessageStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, msg_id: Uuid) -> Result<TimerQueueEntry> {
    sqlx::query_as::<_, TimerQueueEntry>(
        r#"SELECT id, msg_id, send_at_unix, req_json as req, status, created_at
           FROM message_timer_queue WHERE msg_id = $1"#,
    )
    .bind(msg_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound)
}

pub async fn set_status(pool: &PgPool, msg_id: Uuid, status: MessageStatus) -> Result<()> {
    sqlx::query(r#"UPDATE message_timer_queue SET status = $2 WHERE msg_id = $1"#)
        .bind(msg_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}
