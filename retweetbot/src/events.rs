//! Decoding of inbound stream events.
//!
//! Raw v1.1 status objects are converted into [`TweetPayload`]s once, here, so
//! the rest of the bot never inspects untyped JSON.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tweet payload has no id")]
    MissingId,
}

/// Author of a tweet as needed by the command and registration paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub screen_name: String,
    pub description: Option<String>,
    pub protected: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetPayload {
    pub id: String,
    pub text: String,
    pub author: Author,
    /// Id of the original status when this payload is a retweet
    pub retweeted_status_id: Option<String>,
    /// Text of the original status when this payload is a retweet
    pub retweeted_text: Option<String>,
}

impl TweetPayload {
    /// The id an action on this payload logically targets: the original
    /// status for retweets, the payload itself otherwise
    pub fn canonical_id(&self) -> &str {
        self.retweeted_status_id.as_deref().unwrap_or(&self.id)
    }

    /// Whether this payload is a retweet posted by `screen_name`
    pub fn is_retweet_by(&self, screen_name: &str) -> bool {
        self.retweeted_status_id.is_some()
            && self.author.screen_name.eq_ignore_ascii_case(screen_name)
    }

    /// Own text followed by the original's text for retweets
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.text.as_str()).chain(self.retweeted_text.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One or more newly created tweets
    TweetCreate(Vec<TweetPayload>),
    /// The bot's own retweet echoed back by the stream
    OwnRetweet(TweetPayload),
    /// Control messages and anything else that carries no tweet
    Other { kind: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Num(u64),
}

#[derive(Debug, Deserialize)]
struct RawExtendedTweet {
    full_text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    id_str: Option<String>,
    id: Option<RawId>,
    name: String,
    screen_name: String,
    description: Option<String>,
    protected: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id_str: Option<String>,
    id: Option<RawId>,
    #[serde(default)]
    text: String,
    full_text: Option<String>,
    extended_tweet: Option<RawExtendedTweet>,
    #[serde(default)]
    user: RawUser,
    retweeted_status: Option<Box<RawStatus>>,
}

fn resolve_id(id_str: Option<String>, id: Option<RawId>) -> Option<String> {
    id_str.filter(|s| !s.is_empty()).or(match id {
        Some(RawId::Str(s)) if !s.is_empty() => Some(s),
        Some(RawId::Num(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn longest_text(
    extended_tweet: Option<RawExtendedTweet>,
    full_text: Option<String>,
    text: String,
) -> String {
    extended_tweet
        .map(|extended| extended.full_text)
        .or(full_text)
        .unwrap_or(text)
}

impl RawStatus {
    fn into_payload(self) -> Result<TweetPayload, EventError> {
        let id = resolve_id(self.id_str, self.id).ok_or(EventError::MissingId)?;

        let (retweeted_status_id, retweeted_text) = match self.retweeted_status {
            Some(original) => {
                let original = *original;
                let original_id =
                    resolve_id(original.id_str, original.id).ok_or(EventError::MissingId)?;
                let original_text =
                    longest_text(original.extended_tweet, original.full_text, original.text);
                (Some(original_id), Some(original_text))
            }
            None => (None, None),
        };

        let text = longest_text(self.extended_tweet, self.full_text, self.text);

        let user = self.user;
        Ok(TweetPayload {
            id,
            text,
            author: Author {
                id: resolve_id(user.id_str, user.id).unwrap_or_default(),
                name: user.name,
                screen_name: user.screen_name,
                description: user.description.filter(|d| !d.is_empty()),
                protected: user.protected,
                verified: user.verified,
            },
            retweeted_status_id,
            retweeted_text,
        })
    }
}

/// Control message keys the filter stream interleaves with statuses
const CONTROL_KINDS: &[&str] = &[
    "delete",
    "scrub_geo",
    "limit",
    "status_withheld",
    "user_withheld",
    "disconnect",
    "warning",
];

impl StreamEvent {
    /// Decode one line of the stream.
    ///
    /// `bot_screen_name` is used to recognise the bot's own retweets.
    pub fn parse(line: &str, bot_screen_name: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value, bot_screen_name)
    }

    pub fn from_value(value: Value, bot_screen_name: &str) -> Result<Self, EventError> {
        let Some(object) = value.as_object() else {
            return Ok(StreamEvent::Other {
                kind: "non-object".to_string(),
            });
        };

        if let Some(events) = object.get("tweet_create_events") {
            let raw: Vec<RawStatus> = serde_json::from_value(events.clone())?;
            let payloads = raw
                .into_iter()
                .map(RawStatus::into_payload)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(StreamEvent::TweetCreate(payloads));
        }

        if let Some(kind) = CONTROL_KINDS.iter().find(|kind| object.contains_key(**kind)) {
            return Ok(StreamEvent::Other {
                kind: (*kind).to_string(),
            });
        }

        if !object.contains_key("text") && !object.contains_key("full_text") {
            let kind = object
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "empty".to_string());
            return Ok(StreamEvent::Other { kind });
        }

        let payload = serde_json::from_value::<RawStatus>(value)?.into_payload()?;

        if payload.is_retweet_by(bot_screen_name) {
            return Ok(StreamEvent::OwnRetweet(payload));
        }

        Ok(StreamEvent::TweetCreate(vec![payload]))
    }
}
