//! Key-value store adapter.
//!
//! The store is the single source of truth for the cooldown window, the
//! pending-retry entries and the dedup ledger (see [`crate::keys`]). Only three
//! operations are needed: get, set with optional expiry, and list by prefix.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::{Clock, duration_to_millis};

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`. `None` or a zero TTL means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// All live keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .with_context(|| format!("Invalid Redis URL: {redis_url}"))?;
        let connection = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis");
        Ok(Self { connection })
    }
}

/// Escape glob metacharacters so a prefix can be used in a `KEYS` pattern
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .with_context(|| format!("Failed to read key {key} from Redis"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection.clone();
        match effective_ttl(ttl) {
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .query_async(&mut conn)
                    .await
                    .with_context(|| format!("Failed to write key {key} to Redis"))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .with_context(|| format!("Failed to write key {key} to Redis"))?;
            }
        }
        debug!(%key, ?ttl, "Stored key");
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = format!("{escaped}*", escaped = escape_glob(prefix));
        let mut keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .with_context(|| format!("Failed to list keys matching {pattern}"))?;
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<i64>,
}

/// Process-local store with clock-driven expiry
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining time-to-live of a key, `None` when absent or persistent
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        let expires_at = entries.get(key)?.expires_at?;
        u64::try_from(expires_at - now).ok().map(Duration::from_millis)
    }

    fn is_live(entry: &MemoryEntry, now: i64) -> bool {
        entry.expires_at.is_none_or(|at| at > now)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Self::is_live(entry, now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = self.clock.now_millis();
        let expires_at = effective_ttl(ttl).map(|ttl| now.saturating_add(duration_to_millis(ttl)));
        self.entries.lock().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| Self::is_live(entry, now));

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
