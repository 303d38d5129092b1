//! `msg_template`: rendering source for the dispatcher, gated by status.

use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::types::Template;

pub async fn get(pool: &PgPool, template_id: &str) -> Result<Template> {
    sqlx::query_as::<_, Template>(
        r#"SELECT template_id, channel, subject, content, source_id, vendor_template_id, status
           FROM msg_template WHERE template_id = $1"#,
    )
    .bind(template_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::NotFound)
}
