use anyhow::{Context, Result};
use retweetbot::clock::{Clock, SystemClock};
use retweetbot::config::BotConfig;
use retweetbot::context::BotContext;
use retweetbot::twitter::{TwitterApi, TwitterClient, TwitterCredentials};
use std::sync::Arc;

pub mod registrations;
pub mod review;
pub mod run;
pub mod status;
pub mod sweep;

/// Connect every collaborator the bot needs to act on Twitter
pub async fn connect(config: BotConfig) -> Result<(BotContext, Arc<TwitterClient>)> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = config.open_store(clock.clone()).await?;
    let registrations = Arc::new(config.open_registrations().await?);

    let credentials = TwitterCredentials::from_env().context(
        "Twitter credentials missing. Please set TWITTER_CONSUMER_KEY, TWITTER_CONSUMER_SECRET, \
         TWITTER_ACCESS_TOKEN_KEY and TWITTER_ACCESS_TOKEN_SECRET",
    )?;
    let client = Arc::new(TwitterClient::new(credentials)?);
    let twitter: Arc<dyn TwitterApi> = client.clone();

    let ctx = BotContext::new(config, store, twitter, registrations, clock);
    Ok((ctx, client))
}
