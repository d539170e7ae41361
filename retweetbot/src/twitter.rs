use crate::error_utils::{create_stream_client_with_context, get_required_env_var};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use reqwest_oauth1::OAuthClientProvider;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Twitter's documented "Rate limit exceeded" error code
pub const RATE_LIMIT_CODE: i64 = 88;

/// "You have already retweeted this Tweet."
pub const ALREADY_RETWEETED_CODE: i64 = 327;

const TWITTER_API_BASE: &str = "https://api.twitter.com/1.1";
const TWITTER_STREAM_BASE: &str = "https://stream.twitter.com/1.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Twitter sends keep-alive newlines every 30s; three missed ones mean a stall
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(90);

/// Longest line accepted from the streaming endpoint
const MAX_STREAM_LINE: usize = 1024 * 1024;

/// Twitter API errors, decoded once at the HTTP boundary
#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Rate limit exceeded (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Tweet already retweeted")]
    AlreadyRetweeted,

    #[error("API error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TwitterError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TwitterError::RateLimited { .. })
    }
}

/// `{ "errors": [ { "code": 88, "message": "Rate limit exceeded" } ] }`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Twitter API rate limit information extracted from response headers
#[derive(Debug, Clone, Default)]
struct RateLimits {
    /// Number of requests remaining in the current time window
    remaining: Option<u64>,
    /// Unix timestamp when the rate limit resets
    reset: Option<u64>,
}

impl RateLimits {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let header_u64 = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
        };

        Self {
            remaining: header_u64("x-rate-limit-remaining"),
            reset: header_u64("x-rate-limit-reset"),
        }
    }

    fn retry_after(&self, now_secs: u64) -> Option<Duration> {
        self.reset
            .filter(|reset| *reset > now_secs)
            .map(|reset| Duration::from_secs(reset - now_secs))
    }
}

/// Turn a failed response into a typed error
fn decode_error(status: StatusCode, body: &str, rate_limits: &RateLimits, now_secs: u64) -> TwitterError {
    let first = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next());

    match first {
        Some(entry) if entry.code == RATE_LIMIT_CODE => TwitterError::RateLimited {
            retry_after: rate_limits.retry_after(now_secs),
        },
        Some(entry) if entry.code == ALREADY_RETWEETED_CODE => TwitterError::AlreadyRetweeted,
        _ if status == StatusCode::TOO_MANY_REQUESTS => TwitterError::RateLimited {
            retry_after: rate_limits.retry_after(now_secs),
        },
        Some(entry) => TwitterError::Api {
            status: status.as_u16(),
            code: Some(entry.code),
            message: entry.message,
        },
        None => TwitterError::Api {
            status: status.as_u16(),
            code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Outbound write calls the bot makes on behalf of its account
#[async_trait]
pub trait TwitterApi: Send + Sync {
    async fn retweet(&self, tweet_id: &str) -> Result<(), TwitterError>;

    async fn post_reply(&self, in_reply_to: &str, text: &str) -> Result<(), TwitterError>;
}

/// OAuth 1.0a user-context credentials of the bot account
#[derive(Clone)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl TwitterCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            consumer_key: get_required_env_var("TWITTER_CONSUMER_KEY")?,
            consumer_secret: get_required_env_var("TWITTER_CONSUMER_SECRET")?,
            access_token: get_required_env_var("TWITTER_ACCESS_TOKEN_KEY")?,
            access_token_secret: get_required_env_var("TWITTER_ACCESS_TOKEN_SECRET")?,
        })
    }

    fn secrets(&self) -> reqwest_oauth1::Secrets<'_> {
        reqwest_oauth1::Secrets::new(&self.consumer_key, &self.consumer_secret)
            .token(&self.access_token, &self.access_token_secret)
    }
}

impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

/// Twitter API client for retweets, replies and the filtered stream
pub struct TwitterClient {
    client: Client,
    stream_client: Client,
    credentials: TwitterCredentials,
    api_base: String,
    stream_base: String,
}

impl TwitterClient {
    pub fn new(credentials: TwitterCredentials) -> Result<Self> {
        Self::with_base_urls(credentials, TWITTER_API_BASE, TWITTER_STREAM_BASE)
    }

    pub fn with_base_urls(
        credentials: TwitterCredentials,
        api_base: &str,
        stream_base: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            stream_client: create_stream_client_with_context(STREAM_READ_TIMEOUT)?,
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            stream_base: stream_base.trim_end_matches('/').to_string(),
        })
    }

    /// Replace the stream client with one that gives up after `read_timeout` of silence
    pub fn with_stream_read_timeout(mut self, read_timeout: Duration) -> Result<Self> {
        self.stream_client = create_stream_client_with_context(read_timeout)?;
        Ok(self)
    }

    /// Signed form POST; any non-success status is decoded into a [`TwitterError`]
    async fn post_form(
        &self,
        client: &Client,
        url: &str,
        form: Vec<(&str, &str)>,
    ) -> Result<reqwest::Response, TwitterError> {
        debug!(%url, "Making request to Twitter API");

        let response = client
            .clone()
            .oauth1(self.credentials.secrets())
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TwitterError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limits = RateLimits::from_headers(response.headers());
        let body = response.text().await.unwrap_or_default();
        debug!(
            "Twitter API returned {status} for {url}, remaining: {remaining:?}, reset: {reset:?}",
            remaining = rate_limits.remaining,
            reset = rate_limits.reset
        );

        Err(decode_error(status, &body, &rate_limits, unix_now_secs()))
    }

    /// Open `statuses/filter` for the given track terms.
    ///
    /// Yields one JSON document per line; keep-alive blank lines are skipped.
    pub async fn filter_stream(
        &self,
        track: &[String],
    ) -> Result<BoxStream<'static, Result<String, TwitterError>>, TwitterError> {
        let url = format!("{base}/statuses/filter.json", base = self.stream_base);
        let track = track.join(",");

        let response = self
            .post_form(&self.stream_client, &url, vec![("track", track.as_str())])
            .await?;

        let bytes = response
            .bytes_stream()
            .map(|result| result.map_err(std::io::Error::other));
        let reader = StreamReader::new(bytes);

        let lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_STREAM_LINE))
            .filter_map(|line| async move {
                match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(Ok(line)),
                    Err(e) => Some(Err(TwitterError::Network {
                        message: e.to_string(),
                    })),
                }
            });

        Ok(lines.boxed())
    }
}

#[async_trait]
impl TwitterApi for TwitterClient {
    async fn retweet(&self, tweet_id: &str) -> Result<(), TwitterError> {
        let url = format!(
            "{base}/statuses/retweet/{tweet_id}.json",
            base = self.api_base
        );
        self.post_form(&self.client, &url, Vec::new()).await?;
        Ok(())
    }

    async fn post_reply(&self, in_reply_to: &str, text: &str) -> Result<(), TwitterError> {
        let url = format!("{base}/statuses/update.json", base = self.api_base);
        self.post_form(
            &self.client,
            &url,
            vec![("status", text), ("in_reply_to_status_id", in_reply_to)],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> TwitterCredentials {
        TwitterCredentials {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            access_token: "at".to_string(),
            access_token_secret: "ats".to_string(),
        }
    }

    fn test_client(server: &mockito::ServerGuard) -> TwitterClient {
        TwitterClient::with_base_urls(test_credentials(), &server.url(), &server.url()).unwrap()
    }

    #[test]
    fn test_decode_rate_limit_code() {
        let body = r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#;
        let limits = RateLimits {
            remaining: Some(0),
            reset: Some(1_060),
        };

        match decode_error(StatusCode::TOO_MANY_REQUESTS, body, &limits, 1_000) {
            TwitterError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(60)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rate_limit_code_on_forbidden() {
        let body = r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#;
        let err = decode_error(StatusCode::FORBIDDEN, body, &RateLimits::default(), 0);
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_decode_bare_429() {
        let err = decode_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests",
            &RateLimits::default(),
            0,
        );
        assert!(matches!(err, TwitterError::RateLimited { retry_after: None }));
    }

    #[test]
    fn test_decode_already_retweeted() {
        let body = r#"{"errors":[{"code":327,"message":"You have already retweeted this Tweet."}]}"#;
        let err = decode_error(StatusCode::FORBIDDEN, body, &RateLimits::default(), 0);
        assert!(matches!(err, TwitterError::AlreadyRetweeted));
    }

    #[test]
    fn test_decode_other_api_error() {
        let body = r#"{"errors":[{"code":144,"message":"No status found with that ID."}]}"#;
        match decode_error(StatusCode::NOT_FOUND, body, &RateLimits::default(), 0) {
            TwitterError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, Some(144));
                assert_eq!(message, "No status found with that ID.");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_in_the_past_has_no_retry_after() {
        let limits = RateLimits {
            remaining: Some(0),
            reset: Some(10),
        };
        assert_eq!(limits.retry_after(20), None);
    }

    #[tokio::test]
    async fn test_retweet_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/statuses/retweet/100.json")
            .with_status(200)
            .with_body(r#"{"id_str":"999"}"#)
            .create_async()
            .await;

        test_client(&server).retweet("100").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retweet_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/statuses/retweet/300.json")
            .with_status(429)
            .with_body(r#"{"errors":[{"code":88,"message":"Rate limit exceeded"}]}"#)
            .create_async()
            .await;

        let err = test_client(&server).retweet("300").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_post_reply_sends_status_and_reply_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/statuses/update.json")
            .match_header("authorization", mockito::Matcher::Regex("^OAuth ".into()))
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("status".into(), "@alice hello".into()),
                mockito::Matcher::UrlEncoded("in_reply_to_status_id".into(), "42".into()),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        test_client(&server)
            .post_reply("42", "@alice hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_filter_stream_yields_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/statuses/filter.json")
            .with_status(200)
            .with_body("{\"id_str\":\"1\",\"text\":\"a\"}\r\n\r\n{\"id_str\":\"2\",\"text\":\"b\"}\r\n")
            .create_async()
            .await;

        let client = test_client(&server);
        let lines: Vec<String> = client
            .filter_stream(&["#caparledev".to_string()])
            .await
            .unwrap()
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![
                r#"{"id_str":"1","text":"a"}"#.to_string(),
                r#"{"id_str":"2","text":"b"}"#.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stalled_filter_stream_fails() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/statuses/filter.json")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"{\"id_str\":\"1\",\"text\":\"a\"}\r\n")?;
                std::thread::sleep(Duration::from_secs(3));
                Ok(())
            })
            .create_async()
            .await;

        let client = test_client(&server)
            .with_stream_read_timeout(Duration::from_millis(200))
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), async {
            let mut lines = client.filter_stream(&["#caparledev".to_string()]).await?;
            while let Some(line) = lines.next().await {
                line?;
            }
            Ok::<_, TwitterError>(())
        })
        .await
        .expect("stalled stream should fail before the server resumes");

        assert!(matches!(result, Err(TwitterError::Network { .. })));
    }

    #[tokio::test]
    async fn test_filter_stream_connect_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/statuses/filter.json")
            .with_status(420)
            .with_body("Enhance Your Calm")
            .create_async()
            .await;

        let result = test_client(&server)
            .filter_stream(&["#caparledev".to_string()])
            .await;
        assert!(matches!(
            result,
            Err(TwitterError::Api { status: 420, .. })
        ));
    }
}
