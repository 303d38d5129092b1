//! Sliding-window rate limiting and the 30s quota cache that sits in
//! front of it.
//!
//! Two limiter keys exist side by side for a given `(tenant, channel)`:
//! the ordinary admission counter, and a `timer` namespace used by the
//! scheduled-message engine so a backlog of due entries can't starve
//! immediate traffic's budget (or vice versa).

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid rate limit spec `{0}`")]
    InvalidSpec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A parsed `<limit>/<period>` spec, eg. `100/hr` or `local:100/min`.
/// The `local:` prefix forces in-process enforcement even when a shared
/// redis connection has been registered, which is useful for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSpec {
    pub limit: u64,
    pub window: Duration,
    pub force_local: bool,
}

impl TryFrom<&str> for RateLimitSpec {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let (force_local, rest) = match s.strip_prefix("local:") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (limit_str, period_str) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidSpec(s.to_string()))?;
        let limit: u64 = limit_str
            .parse()
            .map_err(|_| Error::InvalidSpec(s.to_string()))?;
        let window = parse_period(period_str).ok_or_else(|| Error::InvalidSpec(s.to_string()))?;
        Ok(Self {
            limit,
            window,
            force_local,
        })
    }
}

impl fmt::Display for RateLimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force_local {
            write!(f, "local:")?;
        }
        write!(f, "{}/{}s", self.limit, self.window.as_secs())
    }
}

fn parse_period(p: &str) -> Option<Duration> {
    match p {
        "s" | "sec" | "second" => Some(Duration::from_secs(1)),
        "m" | "min" | "minute" => Some(Duration::from_secs(60)),
        "h" | "hr" | "hour" => Some(Duration::from_secs(3600)),
        "d" | "day" => Some(Duration::from_secs(86400)),
        other => {
            if let Some(digits) = other.strip_suffix('s') {
                digits.parse().ok().map(Duration::from_secs)
            } else {
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    pub limit: u64,
    pub remaining: u64,
}

static REDIS: OnceLock<redis::aio::ConnectionManager> = OnceLock::new();

/// Registers a shared redis connection manager used by subsequent
/// [`admit`] calls that aren't forced local.
pub fn use_redis(conn: redis::aio::ConnectionManager) {
    let _ = REDIS.set(conn);
}

type LocalStore = Mutex<std::collections::HashMap<String, Vec<f64>>>;
static LOCAL: OnceLock<LocalStore> = OnceLock::new();

fn local_store() -> &'static LocalStore {
    LOCAL.get_or_init(|| Mutex::new(std::collections::HashMap::new()))
}

/// Admits or denies one request against a sliding window of `spec.window`
/// seconds, ending `now`. On store failure this fails closed: the error
/// propagates and the caller must treat it as "not admitted".
pub async fn admit(key: &str, spec: RateLimitSpec, now: std::time::SystemTime) -> Result<Decision> {
    let now_secs = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    if spec.force_local || REDIS.get().is_none() {
        return Ok(local_admit(key, spec, now_secs));
    }

    redis_admit(key, spec, now_secs).await
}

fn local_admit(key: &str, spec: RateLimitSpec, now_secs: f64) -> Decision {
    let floor = now_secs - spec.window.as_secs_f64();
    let mut store = local_store().lock().unwrap();
    let entries = store.entry(key.to_string()).or_default();
    entries.retain(|&ts| ts > floor);
    if (entries.len() as u64) < spec.limit {
        entries.push(now_secs);
        Decision {
            admitted: true,
            limit: spec.limit,
            remaining: spec.limit - entries.len() as u64,
        }
    } else {
        Decision {
            admitted: false,
            limit: spec.limit,
            remaining: 0,
        }
    }
}

// Atomic admission as a single round trip: add the candidate member,
// trim anything older than the window, count survivors, and undo the
// add if the window is already at capacity. All within one script so a
// racing caller can't observe a torn state.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call("ZADD", key, now, member)
redis.call("ZREMRANGEBYSCORE", key, "-inf", now - window)
local count = redis.call("ZCARD", key)
redis.call("EXPIRE", key, math.ceil(window) + 1)

if count > limit then
    redis.call("ZREM", key, member)
    return {0, count - 1}
else
    return {1, count}
end
"#;

async fn redis_admit(key: &str, spec: RateLimitSpec, now_secs: f64) -> Result<Decision> {
    let mut conn = REDIS.get().expect("use_redis must be called first").clone();
    let member = Uuid::new_v4().to_string();
    let script = redis::Script::new(SLIDING_WINDOW_SCRIPT);
    let (admitted, count): (i64, i64) = script
        .key(key)
        .arg(now_secs)
        .arg(spec.window.as_secs_f64())
        .arg(spec.limit)
        .arg(member)
        .invoke_async(&mut conn)
        .await?;
    let count = count.max(0) as u64;
    Ok(Decision {
        admitted: admitted == 1,
        limit: spec.limit,
        remaining: spec.limit.saturating_sub(count),
    })
}

/// Key namespace for the scheduled-message rate limiter, kept distinct
/// from the ordinary immediate-send counter so a burst of due scheduled
/// entries can't exhaust a tenant's live-traffic budget.
pub fn timer_key(tenant: &str, channel: i32) -> String {
    format!("ratelimit:timer:{tenant}:{channel}")
}

pub fn live_key(tenant: &str, channel: i32) -> String {
    format!("ratelimit:{tenant}:{channel}")
}

/// A 30s TTL cache in front of the (global, tenant-override) quota
/// lookup, keyed `"{tenant}/{channel}"`.
pub struct QuotaCache {
    entries: DashMap<String, (QuotaValue, Instant)>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaValue {
    pub limit: u64,
    pub window_seconds: u64,
}

impl fmt::Display for QuotaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.limit, self.window_seconds)
    }
}

impl FromStr for QuotaValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (limit, window) = s
            .split_once('_')
            .ok_or_else(|| Error::InvalidSpec(s.to_string()))?;
        Ok(Self {
            limit: limit.parse().map_err(|_| Error::InvalidSpec(s.to_string()))?,
            window_seconds: window
                .parse()
                .map_err(|_| Error::InvalidSpec(s.to_string()))?,
        })
    }
}

impl Default for QuotaCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl QuotaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, tenant: &str, channel: i32) -> Option<QuotaValue> {
        let key = format!("{tenant}/{channel}");
        let (value, inserted) = *self.entries.get(&key)?;
        if inserted.elapsed() > self.ttl {
            self.entries.remove(&key);
            return None;
        }
        Some(value)
    }

    pub fn put(&self, tenant: &str, channel: i32, value: QuotaValue) {
        let key = format!("{tenant}/{channel}");
        self.entries.insert(key, (value, Instant::now()));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rate_limit_spec_parse() {
        let spec = RateLimitSpec::try_from("100/hr").unwrap();
        assert_eq!(spec.limit, 100);
        assert_eq!(spec.window, Duration::from_secs(3600));
        assert!(!spec.force_local);

        let spec = RateLimitSpec::try_from("local:5/min").unwrap();
        assert_eq!(spec.limit, 5);
        assert_eq!(spec.window, Duration::from_secs(60));
        assert!(spec.force_local);

        assert!(RateLimitSpec::try_from("garbage").is_err());
    }

    #[test]
    fn quota_value_round_trips_through_string() {
        let v = QuotaValue {
            limit: 200,
            window_seconds: 60,
        };
        let s = v.to_string();
        assert_eq!(s, "200_60");
        let parsed: QuotaValue = s.parse().unwrap();
        assert_eq!(parsed, v);
    }

    #[tokio::test]
    async fn local_sliding_window_admits_up_to_limit() {
        let spec = RateLimitSpec::try_from("local:3/min").unwrap();
        let key = format!("test:{}", Uuid::new_v4());
        let now = std::time::SystemTime::now();

        for i in 0..3 {
            let d = admit(&key, spec, now).await.unwrap();
            assert!(d.admitted, "admission {i} should be allowed");
        }
        let d = admit(&key, spec, now).await.unwrap();
        assert!(!d.admitted, "fourth admission should be denied");
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn local_sliding_window_releases_after_expiry() {
        let spec = RateLimitSpec::try_from("local:1/min").unwrap();
        let key = format!("test:{}", Uuid::new_v4());
        let t0 = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);

        assert!(admit(&key, spec, t0).await.unwrap().admitted);
        assert!(!admit(&key, spec, t0).await.unwrap().admitted);

        let later = t0 + Duration::from_secs(61);
        assert!(admit(&key, spec, later).await.unwrap().admitted);
    }

    #[test]
    fn quota_cache_expires_entries() {
        let cache = QuotaCache::new(Duration::from_millis(1));
        cache.put("tenant-a", 1, QuotaValue { limit: 10, window_seconds: 60 });
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("tenant-a", 1).is_none());
    }
}
