use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// JSON serialization/parsing error handling utilities
///
/// Serialize data to pretty JSON with contextual error handling
pub fn serialize_to_json_with_context<T: Serialize>(data: &T, data_desc: &str) -> Result<String> {
    serde_json::to_string_pretty(data)
        .with_context(|| format!("Failed to serialize {data_desc} to JSON"))
}

/// Parse JSON from string with contextual error handling
pub fn parse_json_with_context<T: DeserializeOwned>(json_str: &str, data_desc: &str) -> Result<T> {
    serde_json::from_str(json_str).with_context(|| format!("Failed to parse {data_desc} from JSON"))
}

/// Environment variable handling utilities
///
/// Get required environment variable with contextual error handling
pub fn get_required_env_var(var_name: &str) -> Result<String> {
    std::env::var(var_name).with_context(|| format!("{var_name} environment variable not set"))
}

/// Create HTTP client for the long-lived filter stream with contextual error handling
///
/// No overall timeout; a stream that goes silent for `read_timeout` fails the read.
pub fn create_stream_client_with_context(read_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(read_timeout)
        .build()
        .context("Failed to create stream HTTP client")
}
