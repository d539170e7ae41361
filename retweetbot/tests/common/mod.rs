#![allow(dead_code)]

use async_trait::async_trait;
use retweetbot::actions::ActionOutcome;
use retweetbot::clock::ManualClock;
use retweetbot::config::{BotConfig, DEFAULT_REDIS_URL, StoreKind};
use retweetbot::context::BotContext;
use retweetbot::dispatcher::Dispatcher;
use retweetbot::gate::DEFAULT_COOLDOWN;
use retweetbot::registration::MemoryRegistrationStore;
use retweetbot::store::MemoryStore;
use retweetbot::sweeper::RetrySweeper;
use retweetbot::twitter::{TwitterApi, TwitterError};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

pub const BOT: &str = "caparledev";
pub const START: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Retweet(String),
    Reply { in_reply_to: String, text: String },
}

/// Fake Twitter API that records every call and fails on request
pub struct RecordingTwitter {
    calls: Mutex<Vec<Call>>,
    retweet_failures: Mutex<HashMap<String, VecDeque<TwitterError>>>,
    reply_failures: Mutex<VecDeque<TwitterError>>,
    held: AtomicBool,
    release: Semaphore,
    entered: Notify,
}

impl Default for RecordingTwitter {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            retweet_failures: Mutex::new(HashMap::new()),
            reply_failures: Mutex::new(VecDeque::new()),
            held: AtomicBool::new(false),
            release: Semaphore::new(0),
            entered: Notify::new(),
        }
    }
}

impl RecordingTwitter {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn retweets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Retweet(id) => Some(id),
                Call::Reply { .. } => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Reply { in_reply_to, text } => Some((in_reply_to, text)),
                Call::Retweet(_) => None,
            })
            .collect()
    }

    /// Make the next retweet of `tweet_id` fail with `error`
    pub fn fail_retweet(&self, tweet_id: &str, error: TwitterError) {
        self.retweet_failures
            .lock()
            .unwrap()
            .entry(tweet_id.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fail_next_reply(&self, error: TwitterError) {
        self.reply_failures.lock().unwrap().push_back(error);
    }

    /// Block retweet calls until [`RecordingTwitter::release`]
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.add_permits(1_000);
    }

    /// Wait until a retweet call has been entered
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl TwitterApi for RecordingTwitter {
    async fn retweet(&self, tweet_id: &str) -> Result<(), TwitterError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Retweet(tweet_id.to_string()));
        self.entered.notify_one();

        if self.held.load(Ordering::SeqCst) {
            let _permit = self.release.acquire().await.unwrap();
        }

        let failure = self
            .retweet_failures
            .lock()
            .unwrap()
            .get_mut(tweet_id)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn post_reply(&self, in_reply_to: &str, text: &str) -> Result<(), TwitterError> {
        self.calls.lock().unwrap().push(Call::Reply {
            in_reply_to: in_reply_to.to_string(),
            text: text.to_string(),
        });

        match self.reply_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn rate_limited() -> TwitterError {
    TwitterError::RateLimited { retry_after: None }
}

pub fn test_config() -> BotConfig {
    BotConfig {
        hashtag: BOT.to_string(),
        bot_name: BOT.to_string(),
        store: StoreKind::Memory,
        redis_url: DEFAULT_REDIS_URL.to_string(),
        data_dir: PathBuf::from("unused"),
        key_namespace: "test".to_string(),
        cooldown: DEFAULT_COOLDOWN,
        sweep_interval: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub twitter: Arc<RecordingTwitter>,
    pub registrations: Arc<MemoryRegistrationStore>,
    pub ctx: BotContext,
    pub dispatcher: Dispatcher,
    pub sweeper: RetrySweeper,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let twitter = Arc::new(RecordingTwitter::default());
        let registrations = Arc::new(MemoryRegistrationStore::new());

        let ctx = BotContext::new(
            test_config(),
            store.clone(),
            twitter.clone(),
            registrations.clone(),
            clock.clone(),
        );
        let dispatcher = Dispatcher::new(&ctx).unwrap();
        let sweeper = RetrySweeper::new(&ctx);

        Self {
            clock,
            store,
            twitter,
            registrations,
            ctx,
            dispatcher,
            sweeper,
        }
    }

    /// Dispatch one raw line and wait for every write call it started
    pub async fn feed(&self, line: &str) -> Vec<ActionOutcome> {
        let handles = self.dispatcher.dispatch_line(line).await;
        join_all(handles).await
    }

    pub async fn feed_value(&self, value: Value) -> Vec<ActionOutcome> {
        self.feed(&value.to_string()).await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        use retweetbot::store::KvStore;
        self.store.get(key).await.unwrap()
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        use retweetbot::store::KvStore;
        let keys = self.ctx.keys();
        let mut ids = Vec::new();
        for key in self.store.keys(&keys.pending_prefix()).await.unwrap() {
            if let Some(value) = self.store.get(&key).await.unwrap()
                && !value.is_empty()
            {
                ids.push(value);
            }
        }
        ids
    }
}

pub async fn join_all(handles: Vec<JoinHandle<ActionOutcome>>) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    outcomes
}

/// Filter-stream status authored by `screen_name`
pub fn status(id: &str, text: &str, screen_name: &str) -> Value {
    json!({
        "id_str": id,
        "text": text,
        "user": {
            "id_str": format!("u-{screen_name}"),
            "name": screen_name.to_uppercase(),
            "screen_name": screen_name,
            "description": format!("Profile of {screen_name}"),
            "protected": false,
            "verified": false
        }
    })
}

/// Retweet by `screen_name` of the status `original_id`
pub fn retweet_status(id: &str, original_id: &str, screen_name: &str) -> Value {
    let mut value = status(id, "RT @someone: #caparledev", screen_name);
    value["retweeted_status"] = json!({"id_str": original_id, "text": "#caparledev"});
    value
}
