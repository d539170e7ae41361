use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::keys::KeySpace;
use crate::store::KvStore;

/// Permanent ledger of tweets a retweet has already been started for.
///
/// Check-then-write is not atomic across processes. A duplicate claim in that
/// window only produces an "already retweeted" error from Twitter.
#[derive(Clone)]
pub struct DedupFilter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    keys: KeySpace,
}

impl DedupFilter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, keys: KeySpace) -> Self {
        Self { store, clock, keys }
    }

    /// Claim `canonical_id`. Returns `true` only for the first claim.
    pub async fn should_act(&self, canonical_id: &str) -> Result<bool> {
        let key = self.keys.seen_key(canonical_id);

        if let Some(first_seen) = self.store.get(&key).await? {
            debug!("Tweet {canonical_id} already handled at {first_seen}, skipping");
            return Ok(false);
        }

        let now = self.clock.now_millis().to_string();
        self.store.set(&key, &now, None).await?;
        Ok(true)
    }
}
