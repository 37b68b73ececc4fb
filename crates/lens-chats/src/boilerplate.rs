//! Phrase lists that separate real conversation content from tool scaffolding.
//!
//! Every rule that matches on fixed boilerplate text lives here so the lists can be tuned or
//! loaded from configuration without touching the extraction and screening logic.

use serde::{Deserialize, Serialize};

const METADATA_WRAPPER_TAGS: &[&str] = &[
    "<user_info>",
    "<rules>",
    "<system_reminder>",
    "<always_applied",
];

const BANNER_PHRASES: &[&str] = &[
    "You are gpt-",
    "You are claude-",
    "You are running as",
    "interactive CLI coding agent",
    "Plan mode is active",
];

// Our own summarization and ranking prompts get logged as chats by the agent.
const META_CHAT_INDICATORS: &[&str] = &[
    "Summarize this coding chat in",
    "Update this chat summary with new messages",
    "rank these chat summaries",
    "Rank these chats by relevance to",
    "Return JSON array with relevant chats only",
    "Output ONLY the summary",
    "No actionable content",
];

const NON_ACTIONABLE_PHRASES: &[&str] = &[
    "no actionable content",
    "no specific coding task",
    "no meaningful",
    "user initiated a chat",
    "user started a chat",
    "testing",
    "just saying",
    "no specific task",
    "empty conversation",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
/// Public struct `BoilerplatePolicy` used across chatlens components.
pub struct BoilerplatePolicy {
    /// Tags that mark a user turn as injected context when no `<user_query>` span exists.
    pub metadata_wrapper_tags: Vec<String>,
    /// Model-identity and environment banners; matched only on short messages.
    pub banner_phrases: Vec<String>,
    /// Substrings identifying chats that are chatlens's own completion prompts.
    pub meta_chat_indicators: Vec<String>,
    /// Substrings of completion replies that mean "nothing to summarize".
    pub non_actionable_phrases: Vec<String>,
}

impl Default for BoilerplatePolicy {
    fn default() -> Self {
        Self {
            metadata_wrapper_tags: owned(METADATA_WRAPPER_TAGS),
            banner_phrases: owned(BANNER_PHRASES),
            meta_chat_indicators: owned(META_CHAT_INDICATORS),
            non_actionable_phrases: owned(NON_ACTIONABLE_PHRASES),
        }
    }
}

impl BoilerplatePolicy {
    /// Case-sensitive prefix match on the trimmed text.
    pub fn starts_with_metadata_tag(&self, text: &str) -> bool {
        let trimmed = text.trim();
        self.metadata_wrapper_tags
            .iter()
            .any(|tag| !tag.is_empty() && trimmed.starts_with(tag.as_str()))
    }

    pub fn contains_banner(&self, text: &str) -> bool {
        contains_any_ignore_case(text, &self.banner_phrases)
    }

    pub fn is_meta_chat(&self, content: &str) -> bool {
        contains_any_ignore_case(content, &self.meta_chat_indicators)
    }

    pub fn contains_non_actionable_phrase(&self, text: &str) -> bool {
        contains_any_ignore_case(text, &self.non_actionable_phrases)
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn contains_any_ignore_case(haystack: &str, needles: &[String]) -> bool {
    let lowered = haystack.to_lowercase();
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .any(|needle| lowered.contains(&needle.to_lowercase()))
}
