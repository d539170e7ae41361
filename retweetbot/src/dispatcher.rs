//! Routes decoded stream events to the retweet path or to a mention command.
//!
//! Only tweets carrying the tracked hashtag are retweeted; the stream also
//! delivers plain mentions of the bot, which are dropped unless they are
//! commands.
//!
//! Ledger claims are awaited in arrival order so duplicates within one batch
//! are caught. Write calls run as detached tasks; the stream loop drops their
//! handles, tests await them.

use anyhow::{Context, Result};
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionOutcome, BotActions};
use crate::context::BotContext;
use crate::dedup::DedupFilter;
use crate::events::{StreamEvent, TweetPayload};
use crate::mention::{MentionCommand, MentionParser};
use crate::registration::RegistrationService;

#[derive(Clone)]
pub struct Dispatcher {
    dedup: DedupFilter,
    actions: BotActions,
    registrations: RegistrationService,
    mentions: MentionParser,
    hashtag: Regex,
}

fn hashtag_pattern(hashtag: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"(?i)#{tag}(?:$|[^\w])",
        tag = regex::escape(hashtag.trim_start_matches('#'))
    ))
    .context("Failed to build hashtag pattern")
}

impl Dispatcher {
    pub fn new(ctx: &BotContext) -> Result<Self> {
        Ok(Self {
            dedup: ctx.dedup(),
            actions: ctx.actions(),
            registrations: ctx.registration_service(),
            mentions: MentionParser::new(&ctx.config.bot_name)?,
            hashtag: hashtag_pattern(&ctx.config.hashtag)?,
        })
    }

    fn carries_hashtag(&self, payload: &TweetPayload) -> bool {
        payload.texts().any(|text| self.hashtag.is_match(text))
    }

    /// Decode one raw stream line and dispatch it. Malformed lines are dropped.
    pub async fn dispatch_line(&self, line: &str) -> Vec<JoinHandle<ActionOutcome>> {
        let line = line.trim();
        if line.is_empty() {
            // keep-alive newline
            return Vec::new();
        }

        match StreamEvent::parse(line, self.mentions.bot_name()) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                warn!("Dropping malformed stream event: {e}");
                debug!("Malformed line: {line}");
                Vec::new()
            }
        }
    }

    pub async fn dispatch(&self, event: StreamEvent) -> Vec<JoinHandle<ActionOutcome>> {
        match event {
            StreamEvent::TweetCreate(payloads) => {
                let mut handles = Vec::with_capacity(payloads.len());
                for payload in payloads {
                    if let Some(handle) = self.dispatch_payload(payload).await {
                        handles.push(handle);
                    }
                }
                handles
            }
            StreamEvent::OwnRetweet(payload) => {
                self.record_own_retweet(&payload).await;
                Vec::new()
            }
            StreamEvent::Other { kind } => {
                debug!("Ignoring {kind} event");
                Vec::new()
            }
        }
    }

    /// Claim the original of the bot's own retweet without any write call
    async fn record_own_retweet(&self, payload: &TweetPayload) {
        let canonical_id = payload.canonical_id();
        match self.dedup.should_act(canonical_id).await {
            Ok(true) => debug!("Recorded own retweet of {canonical_id} in the ledger"),
            Ok(false) => debug!("Own retweet of {canonical_id} echoed back, ignoring"),
            Err(e) => error!("Failed to record own retweet of {canonical_id}: {e:#}"),
        }
    }

    async fn dispatch_payload(&self, payload: TweetPayload) -> Option<JoinHandle<ActionOutcome>> {
        if payload.is_retweet_by(self.mentions.bot_name()) {
            self.record_own_retweet(&payload).await;
            return None;
        }

        if payload.retweeted_status_id.is_none()
            && let Some(command) = self.mentions.parse(&payload.text)
        {
            return self.dispatch_command(payload, command);
        }

        if !self.carries_hashtag(&payload) {
            debug!(
                "Tweet {id} from @{screen_name} lacks the hashtag, ignoring",
                id = payload.id,
                screen_name = payload.author.screen_name
            );
            return None;
        }

        let canonical_id = payload.canonical_id().to_string();
        match self.dedup.should_act(&canonical_id).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                error!("Failed to check ledger for {canonical_id}: {e:#}");
                return None;
            }
        }

        let actions = self.actions.clone();
        Some(tokio::spawn(async move {
            actions.retweet(&canonical_id).await.unwrap_or_else(|e| {
                error!("Retweet of {canonical_id} failed: {e:#}");
                ActionOutcome::Failed
            })
        }))
    }

    fn dispatch_command(
        &self,
        payload: TweetPayload,
        command: MentionCommand,
    ) -> Option<JoinHandle<ActionOutcome>> {
        let screen_name = payload.author.screen_name.clone();

        match command {
            MentionCommand::Register { description } => {
                let registrations = self.registrations.clone();
                Some(tokio::spawn(async move {
                    match registrations.submit(&payload, &description).await {
                        Ok(outcome) => {
                            debug!("Registration from @{screen_name}: {outcome:?}");
                            ActionOutcome::Done
                        }
                        Err(e) => {
                            error!("Failed to register @{screen_name}: {e:#}");
                            ActionOutcome::Failed
                        }
                    }
                }))
            }
            MentionCommand::Search { query } if query.is_empty() => {
                info!("Empty search from @{screen_name}, ignoring");
                None
            }
            MentionCommand::Search { query } => {
                let url = match self.mentions.search_url(&query) {
                    Ok(url) => url,
                    Err(e) => {
                        error!("Failed to build search link for @{screen_name}: {e:#}");
                        return None;
                    }
                };

                let actions = self.actions.clone();
                Some(tokio::spawn(async move {
                    actions
                        .reply(&payload.id, &screen_name, url.as_str())
                        .await
                        .unwrap_or_else(|e| {
                            error!("Reply to @{screen_name} failed: {e:#}");
                            ActionOutcome::Failed
                        })
                }))
            }
            MentionCommand::Unknown { word } => {
                info!("Unknown command {word:?} from @{screen_name}: {text}", text = payload.text);
                None
            }
        }
    }
}
