//! Rate-limit gate.
//!
//! Write calls (retweets, replies) are allowed unless a cooldown deadline is
//! stored under the cooldown key. A rate-limit error stores `now + window`
//! with a TTL equal to the window, and queues the failed tweet for a retry.
//! Queued entries live for two windows so they outlast the cooldown.
//! The gate keeps no state of its own besides the store handle.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, duration_to_millis, format_millis_for_display};
use crate::keys::KeySpace;
use crate::store::KvStore;
use crate::twitter::TwitterError;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct RateLimitGate {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    keys: KeySpace,
    window: Duration,
}

impl RateLimitGate {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        keys: KeySpace,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            keys,
            window,
        }
    }

    /// Lifetime of a pending-retry entry
    pub fn pending_ttl(&self) -> Duration {
        self.window.saturating_mul(2)
    }

    /// Stored cooldown deadline, if any. Garbage is logged and ignored.
    async fn deadline(&self) -> Result<Option<i64>> {
        let key = self.keys.cooldown_key();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(deadline) => Ok(Some(deadline)),
            Err(_) => {
                warn!("Ignoring unparsable cooldown deadline {raw:?} under {key}");
                Ok(None)
            }
        }
    }

    /// Whether write calls are currently permitted
    pub async fn can_proceed(&self) -> Result<bool> {
        let Some(deadline) = self.deadline().await? else {
            return Ok(true);
        };

        let now = self.clock.now_millis();
        if deadline <= now {
            return Ok(true);
        }

        info!(
            "Write calls suspended for another {minutes:.1} min (until {until})",
            minutes = (deadline - now) as f64 / 60_000.0,
            until = format_millis_for_display(deadline)
        );
        Ok(false)
    }

    /// Time left in the current cooldown window
    pub async fn remaining(&self) -> Result<Option<Duration>> {
        let now = self.clock.now_millis();
        Ok(self
            .deadline()
            .await?
            .and_then(|deadline| u64::try_from(deadline - now).ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis))
    }

    /// Inspect a failed write call.
    ///
    /// Returns `true` when the error was a rate limit, in which case the
    /// cooldown window is (re)started and `tweet_id`, if given, is queued for
    /// the retry sweeper. Other errors are left to the caller.
    pub async fn record_failure(&self, error: &TwitterError, tweet_id: Option<&str>) -> Result<bool> {
        let TwitterError::RateLimited { retry_after } = error else {
            return Ok(false);
        };

        let deadline = self
            .clock
            .now_millis()
            .saturating_add(duration_to_millis(self.window));

        self.store
            .set(
                &self.keys.cooldown_key(),
                &deadline.to_string(),
                Some(self.window),
            )
            .await?;

        warn!(
            "Rate limited by Twitter (reported reset in {retry_after:?}), suspending write calls until {until}",
            until = format_millis_for_display(deadline)
        );

        if let Some(tweet_id) = tweet_id {
            self.store
                .set(&self.keys.pending_key(tweet_id), tweet_id, Some(self.pending_ttl()))
                .await?;
            debug!("Queued tweet {tweet_id} for retry");
        }

        Ok(true)
    }
}
