//! Hashtag retweet bot for Twitter.
//!
//! Listens to the filter stream for a hashtag, retweets each matching tweet
//! once, answers `register` and `search` mentions, and backs off for a fixed
//! window when Twitter reports a rate limit. Rate-limited retweets are queued
//! in the key-value store and retried by a periodic sweeper.

pub mod actions;
pub mod clock;
pub mod config;
pub mod context;
pub mod dedup;
pub mod dispatcher;
pub mod error_utils;
pub mod events;
pub mod filename_utils;
pub mod gate;
pub mod keys;
pub mod mention;
pub mod registration;
pub mod store;
pub mod stream;
pub mod sweeper;
pub mod twitter;
