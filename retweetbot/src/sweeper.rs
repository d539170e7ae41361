//! Periodic re-drain of tweets whose retweet hit the rate limit.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::actions::BotActions;
use crate::context::BotContext;
use crate::keys::KeySpace;
use crate::store::KvStore;

/// TTL of a blanked pending entry
const CLEARED_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys returned by the prefix listing
    pub listed: usize,
    /// Retweet attempts made
    pub attempted: usize,
    pub cleared: usize,
    pub left_pending: usize,
}

#[derive(Clone)]
pub struct RetrySweeper {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    actions: BotActions,
    running: Arc<Mutex<()>>,
}

impl RetrySweeper {
    pub fn new(ctx: &BotContext) -> Self {
        Self {
            store: ctx.store.clone(),
            keys: ctx.keys(),
            actions: ctx.actions(),
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run one sweep. Returns `Ok(None)` without doing anything when another
    /// sweep is still in progress.
    pub async fn sweep(&self) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Previous sweep still running, skipping");
            return Ok(None);
        };

        let keys = self.store.keys(&self.keys.pending_prefix()).await?;
        let mut report = SweepReport {
            listed: keys.len(),
            ..Default::default()
        };

        for key in keys {
            let tweet_id = match self.store.get(&key).await {
                Ok(Some(value)) if !value.trim().is_empty() => value.trim().to_string(),
                Ok(_) => continue,
                Err(e) => {
                    error!("Failed to read {key}: {e:#}");
                    report.left_pending += 1;
                    continue;
                }
            };

            report.attempted += 1;
            let outcome = match self.actions.retweet(&tweet_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Retry of {tweet_id} failed: {e:#}");
                    report.left_pending += 1;
                    continue;
                }
            };

            if outcome.is_success() {
                if let Err(e) = self.store.set(&key, "", Some(CLEARED_TTL)).await {
                    error!("Retry of {tweet_id} succeeded but {key} could not be cleared: {e:#}");
                    report.left_pending += 1;
                    continue;
                }
                report.cleared += 1;
                debug!("Retry of {tweet_id} succeeded, cleared {key}");
            } else {
                report.left_pending += 1;
                debug!("Retry of {tweet_id} ended with {outcome:?}, keeping {key}");
            }
        }

        if report.attempted > 0 {
            info!(
                "Sweep finished: {attempted} attempted, {cleared} cleared, {left_pending} still pending",
                attempted = report.attempted,
                cleared = report.cleared,
                left_pending = report.left_pending
            );
        }

        Ok(Some(report))
    }

    /// Sweep every `interval` until `shutdown` flips to `true`
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = self.clone();
                        // overlapping runs return early inside sweep()
                        tokio::spawn(async move {
                            if let Err(e) = sweeper.sweep().await {
                                error!("Retry sweep failed: {e:#}");
                            }
                        });
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Retry sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

