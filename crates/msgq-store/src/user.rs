//! `user`: recipient resolution for user-id and tag-targeted sends.

use sqlx::PgPool;

use crate::error::Result;
use crate::types::User;

pub async fn find_by_user_id(pool: &PgPool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(
        r#"SELECT user_id, name, mobile, email, chat_id, tags_json as tags, status
           FROM "user" WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Users matching any of `tags`. Callers are responsible for
/// de-duplicating against a direct/user-id set, as the scheduled engine
/// and the ingress pipeline both do.
pub async fn find_by_any_tags(pool: &PgPool, tags: &[String]) -> Result<Vec<User>> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, User>(
        r#"SELECT user_id, name, mobile, email, chat_id, tags_json as tags, status
           FROM "user" WHERE tags_json ?| $1"#,
    )
    .bind(tags)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
