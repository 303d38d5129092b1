//! Relational persistence for the dispatcher: message records, the
//! table-mode queue, the timer queue, templates, users and quotas.
//!
//! Everything is reached through a [`Store`] handle wrapping a
//! `sqlx::PgPool`; callers never issue raw SQL.

pub mod error;
pub mod message_queue;
pub mod message_record;
pub mod quota;
pub mod scheduled;
pub mod template;
pub mod timer_queue;
pub mod types;
pub mod user;

pub use error::{Error, Result};
pub use types::*;

use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Db(sqlx::Error::from(e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
