//! Turns raw blob payloads into clean, speaker-tagged messages.
//!
//! Extraction is a pure function of its input. Each message derives from exactly one blob and
//! output order follows input order.

use std::sync::OnceLock;

use lens_core::truncate_chars;
use regex::Regex;
use serde_json::Value;

use crate::boilerplate::BoilerplatePolicy;
use crate::types::{BlobRecord, Message, MessageRole};

const MIN_MESSAGE_CHARS: usize = 10;
const BANNER_SCAN_MAX_CHARS: usize = 500;
const MAX_MESSAGE_CHARS: usize = 2_000;
const SYSTEM_REMINDER_OPEN: &str = "<system_reminder>";
const SYSTEM_REMINDER_CLOSE: &str = "</system_reminder>";

fn user_query_regex() -> Option<&'static Regex> {
    static USER_QUERY: OnceLock<Option<Regex>> = OnceLock::new();
    USER_QUERY
        .get_or_init(|| Regex::new(r"(?s)<user_query>\s*(.*?)\s*</user_query>").ok())
        .as_ref()
}

#[derive(Debug, Clone, Copy)]
pub struct ContentExtractor<'a> {
    policy: &'a BoilerplatePolicy,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(policy: &'a BoilerplatePolicy) -> Self {
        Self { policy }
    }

    pub fn extract<'b, I>(&self, blobs: I) -> Vec<Message>
    where
        I: IntoIterator<Item = &'b BlobRecord>,
    {
        blobs
            .into_iter()
            .filter_map(|blob| self.extract_one(blob))
            .collect()
    }

    /// Returns the message carried by `blob`, or `None` when it is noise.
    pub fn extract_one(&self, blob: &BlobRecord) -> Option<Message> {
        let object = blob.payload.as_object()?;
        let role = object
            .get("role")
            .and_then(Value::as_str)
            .filter(|role| !role.is_empty())?;
        let content = object.get("content").filter(|content| is_truthy(content))?;

        let role = MessageRole::parse(role);
        if role == MessageRole::System {
            return None;
        }

        let mut text = extract_text_content(content);
        if text.trim().chars().count() < MIN_MESSAGE_CHARS {
            return None;
        }

        if role == MessageRole::User {
            let query = extract_user_query(&text, self.policy);
            if query.trim().chars().count() < MIN_MESSAGE_CHARS {
                return None;
            }
            text = query;
        }

        if self.is_banner(&text) {
            return None;
        }

        Some(Message {
            role,
            text: truncate_chars(&text, MAX_MESSAGE_CHARS).to_string(),
            source_blob_id: blob.id.clone(),
        })
    }

    fn is_banner(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.chars().count() <= BANNER_SCAN_MAX_CHARS && self.policy.contains_banner(trimmed)
    }
}

/// Flattens message content. Strings pass through; part lists keep only `text` parts, joined
/// by a space. Any other shape yields an empty string.
pub fn extract_text_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(Value::as_object)
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .map(|part| part.get("text").and_then(Value::as_str).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Isolates what the user actually typed from the context the agent wraps around it.
///
/// Returns an empty string when the text is injected context only.
pub fn extract_user_query(text: &str, policy: &BoilerplatePolicy) -> String {
    if let Some(query) = user_query_regex()
        .and_then(|pattern| pattern.captures(text))
        .and_then(|captures| captures.get(1))
    {
        return query.as_str().trim().to_string();
    }

    if policy.starts_with_metadata_tag(text) {
        return String::new();
    }

    if text.contains(SYSTEM_REMINDER_OPEN) {
        if let Some((_, remainder)) = text.rsplit_once(SYSTEM_REMINDER_CLOSE) {
            return remainder.trim().to_string();
        }
    }

    text.to_string()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
