//! Outbound write calls, always routed through the rate-limit gate.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::gate::RateLimitGate;
use crate::twitter::{TwitterApi, TwitterError};

/// Longest status Twitter accepts
pub const MAX_TWEET_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The write call succeeded
    Done,
    /// Twitter reported the retweet already exists
    AlreadyDone,
    /// Cooldown active, no call attempted
    Suppressed,
    /// The call hit the rate limit and the cooldown was started
    RateLimited,
    /// The call failed for another reason (logged)
    Failed,
    /// Reply text too long, no call attempted
    TooLong,
}

impl ActionOutcome {
    /// Whether the intended effect now exists on Twitter
    pub fn is_success(self) -> bool {
        matches!(self, ActionOutcome::Done | ActionOutcome::AlreadyDone)
    }
}

#[derive(Clone)]
pub struct BotActions {
    api: Arc<dyn TwitterApi>,
    gate: RateLimitGate,
}

impl BotActions {
    pub fn new(api: Arc<dyn TwitterApi>, gate: RateLimitGate) -> Self {
        Self { api, gate }
    }

    /// Retweet `tweet_id`. A rate-limited attempt queues the id for retry.
    pub async fn retweet(&self, tweet_id: &str) -> Result<ActionOutcome> {
        if !self.gate.can_proceed().await? {
            debug!("Skipping retweet of {tweet_id} during cooldown");
            return Ok(ActionOutcome::Suppressed);
        }

        match self.api.retweet(tweet_id).await {
            Ok(()) => {
                info!("Retweeted {tweet_id}");
                Ok(ActionOutcome::Done)
            }
            Err(TwitterError::AlreadyRetweeted) => {
                debug!("Tweet {tweet_id} was already retweeted");
                Ok(ActionOutcome::AlreadyDone)
            }
            Err(e) => self.handle_failure(e, Some(tweet_id), "retweet").await,
        }
    }

    /// Reply to `screen_name` under `in_reply_to`. Replies are never queued.
    pub async fn reply(
        &self,
        in_reply_to: &str,
        screen_name: &str,
        message: &str,
    ) -> Result<ActionOutcome> {
        let status = format!("@{screen_name} {message}");
        if status.chars().count() > MAX_TWEET_CHARS {
            info!("The tweet is too long, not replying to {in_reply_to}: {status}");
            return Ok(ActionOutcome::TooLong);
        }

        if !self.gate.can_proceed().await? {
            debug!("Skipping reply to {in_reply_to} during cooldown");
            return Ok(ActionOutcome::Suppressed);
        }

        match self.api.post_reply(in_reply_to, &status).await {
            Ok(()) => {
                info!("Replied to @{screen_name} on {in_reply_to}");
                Ok(ActionOutcome::Done)
            }
            Err(e) => self.handle_failure(e, None, "reply").await,
        }
    }

    async fn handle_failure(
        &self,
        error: TwitterError,
        tweet_id: Option<&str>,
        action: &str,
    ) -> Result<ActionOutcome> {
        if self.gate.record_failure(&error, tweet_id).await? {
            return Ok(ActionOutcome::RateLimited);
        }

        error!(
            "Failed to {action} {target}: {error}",
            target = tweet_id.unwrap_or("status")
        );
        Ok(ActionOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_outcomes() {
        assert!(ActionOutcome::Done.is_success());
        assert!(ActionOutcome::AlreadyDone.is_success());
        assert!(!ActionOutcome::Suppressed.is_success());
        assert!(!ActionOutcome::RateLimited.is_success());
        assert!(!ActionOutcome::Failed.is_success());
        assert!(!ActionOutcome::TooLong.is_success());
    }
}
