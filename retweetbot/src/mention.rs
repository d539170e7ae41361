//! Commands addressed to the bot in a mention, e.g. `@bot register ...`.

use anyhow::{Context, Result};
use regex::Regex;
use url::Url;

const SEARCH_BASE_URL: &str = "https://twitter.com/search";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionCommand {
    /// Registration request; `description` is the text after the command word
    Register { description: String },
    Search { query: String },
    Unknown { word: String },
}

/// Recognises `@{bot} <word> [rest]` at the start of a tweet
#[derive(Debug, Clone)]
pub struct MentionParser {
    bot_name: String,
    pattern: Regex,
}

impl MentionParser {
    pub fn new(bot_name: &str) -> Result<Self> {
        let bot_name = bot_name.trim_start_matches('@').to_string();
        let pattern = Regex::new(&format!(
            r"(?is)^@{name}\s+(\S+)\s*(.*)$",
            name = regex::escape(&bot_name)
        ))
        .context("Failed to build mention pattern")?;
        Ok(Self { bot_name, pattern })
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Returns `None` when the tweet is not a command mention
    pub fn parse(&self, text: &str) -> Option<MentionCommand> {
        let captures = self.pattern.captures(text.trim())?;
        let word = captures.get(1)?.as_str();
        let rest = captures.get(2).map_or("", |m| m.as_str()).trim().to_string();

        let command = match word.to_lowercase().as_str() {
            "register" => MentionCommand::Register { description: rest },
            "s" | "search" => MentionCommand::Search { query: rest },
            _ => MentionCommand::Unknown {
                word: word.to_string(),
            },
        };
        Some(command)
    }

    /// Twitter search link for mentions of the bot matching `query`
    pub fn search_url(&self, query: &str) -> Result<Url> {
        let q = format!("@{bot} {query}", bot = self.bot_name, query = query.trim());
        Url::parse_with_params(SEARCH_BASE_URL, &[("q", q.as_str()), ("src", "typed_query")])
            .context("Failed to build search URL")
    }
}
