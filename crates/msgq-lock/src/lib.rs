//! A renewable single-instance distributed lock, used to elect one
//! leader per priority in table-mode queue draining.
//!
//! Acquisition is non-blocking (`SET key token NX PX ttl`); a held lock
//! is kept alive by a background watchdog that extends the lease every
//! `ttl / 3`. Release is explicit (`unlock`) so that callers control
//! exactly when the lease is given up — on normal loop exit, on signal
//! shutdown, and on panic recovery.

use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

pub const LOCK_KEY_PREFIX: &str = "MSG_LEADER_CONSUMER";
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(30);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Formats the lock key for a given priority name, eg. `HIGH`, `RETRY`.
pub fn priority_lock_key(priority: &str) -> String {
    format!("{LOCK_KEY_PREFIX}:{priority}")
}

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// An acquired lock. The watchdog task is aborted on drop; if the holder
/// is dropped without calling [`LockGuard::unlock`], the lease simply
/// expires after its TTL rather than being actively released.
pub struct LockGuard {
    key: String,
    token: String,
    conn: redis::aio::ConnectionManager,
    watchdog: Option<JoinHandle<()>>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Actively releases the lock if we still hold it, and stops the
    /// watchdog. Safe to call from a panic-recovery path.
    pub async fn unlock(mut self) -> Result<()> {
        if let Some(h) = self.watchdog.take() {
            h.abort();
        }
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await?;
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(h) = self.watchdog.take() {
            h.abort();
        }
    }
}

/// Attempts to acquire `key` for `ttl`, returning `None` immediately if
/// someone else already holds it (never blocks).
pub async fn try_lock(
    mut conn: redis::aio::ConnectionManager,
    key: &str,
    ttl: Duration,
) -> Result<Option<LockGuard>> {
    let token = Uuid::new_v4().to_string();
    let acquired: bool = redis::cmd("SET")
        .arg(key)
        .arg(&token)
        .arg("NX")
        .arg("PX")
        .arg(ttl.as_millis() as u64)
        .query_async::<Option<String>>(&mut conn)
        .await?
        .is_some();

    if !acquired {
        return Ok(None);
    }

    let watchdog_conn = conn.clone();
    let watchdog_key = key.to_string();
    let watchdog_token = token.clone();
    let renew_every = ttl / 3;
    let watchdog = tokio::spawn(async move {
        let mut conn = watchdog_conn;
        loop {
            tokio::time::sleep(renew_every).await;
            let script = redis::Script::new(EXTEND_SCRIPT);
            let renewed: redis::RedisResult<i64> = script
                .key(&watchdog_key)
                .arg(&watchdog_token)
                .arg(ttl.as_millis() as u64)
                .invoke_async(&mut conn)
                .await;
            match renewed {
                Ok(1) => continue,
                Ok(_) => {
                    tracing::warn!(key = %watchdog_key, "lost leader lock, not renewed");
                    return;
                }
                Err(err) => {
                    tracing::error!(key = %watchdog_key, %err, "failed to renew leader lock");
                    return;
                }
            }
        }
    });

    Ok(Some(LockGuard {
        key: key.to_string(),
        token,
        conn,
        watchdog: Some(watchdog),
    }))
}

/// Also exposed independently of the guard's abort-on-drop behavior, for
/// a supervisor that needs to force-release a lock it knows it still
/// holds after catching a panic from the consumer task.
pub async fn force_unlock(
    mut conn: redis::aio::ConnectionManager,
    key: &str,
    token: &str,
) -> Result<()> {
    let script = redis::Script::new(RELEASE_SCRIPT);
    let _: i64 = script.key(key).arg(token).invoke_async(&mut conn).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_key_format() {
        assert_eq!(priority_lock_key("HIGH"), "MSG_LEADER_CONSUMER:HIGH");
    }

    #[test]
    fn defaults_match_the_modeled_system() {
        assert_eq!(DEFAULT_EXPIRE, Duration::from_secs(30));
        assert_eq!(RETRY_INTERVAL, Duration::from_secs(30));
    }
}
