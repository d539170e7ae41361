//! Key layout inside the key-value store.
//!
//! ```text
//! {ns}:cooldown          → epoch millis when writes are allowed again (TTL = window)
//! {ns}:pending:{tweet}   → tweet id awaiting a retry (TTL = 2 × window, "" once cleared)
//! {ns}:seen:{tweet}      → epoch millis of first processing (no TTL)
//! ```

pub const DEFAULT_NAMESPACE: &str = "retweetbot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cooldown_key(&self) -> String {
        format!("{ns}:cooldown", ns = self.namespace)
    }

    pub fn pending_prefix(&self) -> String {
        format!("{ns}:pending:", ns = self.namespace)
    }

    pub fn pending_key(&self, tweet_id: &str) -> String {
        format!("{prefix}{tweet_id}", prefix = self.pending_prefix())
    }

    pub fn seen_key(&self, tweet_id: &str) -> String {
        format!("{ns}:seen:{tweet_id}", ns = self.namespace)
    }

    /// Recover the tweet id from a key returned by a pending-prefix listing
    pub fn pending_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.pending_prefix())
            .filter(|id| !id.is_empty())
    }
}
