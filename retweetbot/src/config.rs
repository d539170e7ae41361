use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::Clock;
use crate::keys::KeySpace;
use crate::registration::JsonRegistrationStore;
use crate::store::{KvStore, MemoryStore, RedisStore};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";

/// Backend for cooldown, pending retries and the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Redis,
    /// Process-local, lost on exit
    Memory,
}

/// Settings shared by every component, fixed at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Tracked hashtag, without the leading `#`
    pub hashtag: String,
    /// Bot account screen name, without the leading `@`
    pub bot_name: String,
    pub store: StoreKind,
    pub redis_url: String,
    pub data_dir: PathBuf,
    pub key_namespace: String,
    pub cooldown: Duration,
    pub sweep_interval: Duration,
}

/// Cooldown window from a minute count, saturating instead of overflowing
pub fn cooldown_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

impl BotConfig {
    pub fn keys(&self) -> KeySpace {
        KeySpace::new(self.key_namespace.clone())
    }

    /// Track terms for the filter stream: the hashtag and mentions of the bot
    pub fn track(&self) -> Vec<String> {
        vec![
            format!("#{tag}", tag = self.hashtag.trim_start_matches('#')),
            format!("@{name}", name = self.bot_name.trim_start_matches('@')),
        ]
    }

    pub async fn open_store(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn KvStore>> {
        match self.store {
            StoreKind::Redis => {
                let store = RedisStore::connect(&self.redis_url)
                    .await
                    .with_context(|| format!("Failed to connect to Redis at {}", self.redis_url))?;
                info!("Using Redis store at {url}", url = self.redis_url);
                Ok(Arc::new(store))
            }
            StoreKind::Memory => {
                info!("Using in-memory store; cooldowns and the ledger will not survive a restart");
                Ok(Arc::new(MemoryStore::new(clock)))
            }
        }
    }

    pub async fn open_registrations(&self) -> Result<JsonRegistrationStore> {
        JsonRegistrationStore::open(&self.data_dir).await
    }
}
