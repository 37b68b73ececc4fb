use lens_ai::{CompletionClient, CompletionRequest, DEFAULT_COMPLETION_TIMEOUT_MS};
use lens_chats::{BoilerplatePolicy, Message};
use lens_core::{count_alphabetic, truncate_chars, truncate_words, word_count};
use serde::Serialize;
use tracing::{debug, warn};

/// Default upper bound on summary length.
pub const DEFAULT_SUMMARY_MAX_WORDS: usize = 70;
/// Character budget for serialized messages in one prompt.
pub const PROMPT_BUDGET_CHARS: usize = 6_000;

const OVERFLOW_KEEP_CHARS: usize = 200;
const OVERFLOW_MARKER: &str = "... [trimmed]";
const MIN_SUMMARY_WORDS: usize = 10;
const MIN_SUMMARY_ALPHABETIC: usize = 50;
const MIN_CONTENT_CHARS: usize = 100;
const MIN_CONTENT_ALPHABETIC: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Message shape embedded in prompts.
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for PromptMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.text.clone(),
        }
    }
}

/// Keeps leading messages while their compact JSON fits in `budget_chars`.
///
/// The first message that does not fit is kept in shortened form when its content is long
/// enough to be worth a preview; nothing after it is kept.
pub fn trim_prompt_messages(messages: &[Message], budget_chars: usize) -> Vec<PromptMessage> {
    let mut kept = Vec::new();
    let mut total = 0usize;
    for message in messages {
        let prompt_message = PromptMessage::from(message);
        let encoded_len = serde_json::to_string(&prompt_message)
            .map(|encoded| encoded.chars().count())
            .unwrap_or(usize::MAX);
        if total.saturating_add(encoded_len) > budget_chars {
            if prompt_message.content.chars().count() > OVERFLOW_KEEP_CHARS {
                let preview = truncate_chars(&prompt_message.content, OVERFLOW_KEEP_CHARS);
                kept.push(PromptMessage {
                    role: prompt_message.role,
                    content: format!("{preview}{OVERFLOW_MARKER}"),
                });
            }
            break;
        }
        total += encoded_len;
        kept.push(prompt_message);
    }
    kept
}

/// Builds the fresh prompt, or the update prompt when a non-blank prior summary is given.
pub fn build_summary_prompt(
    messages: &[Message],
    max_words: usize,
    prior_summary: Option<&str>,
) -> String {
    let trimmed = trim_prompt_messages(messages, PROMPT_BUDGET_CHARS);
    let messages_json = serde_json::to_string_pretty(&trimmed).unwrap_or_else(|_| "[]".into());

    match prior_summary.filter(|prior| !prior.trim().is_empty()) {
        Some(prior) => format!(
            "Update this chat summary with new messages. Max {max_words} words.

EXISTING SUMMARY:
{prior}

NEW MESSAGES:
{messages_json}

Create an updated summary incorporating the new content. Focus on tasks, technologies, and outcomes.
Output ONLY the updated summary."
        ),
        None => format!(
            "Summarize this coding chat in {max_words} words or less.

FOCUS ON:
- The specific task/problem the user wanted to solve
- Technologies, frameworks, or files involved
- Key outcomes or solutions implemented

DO NOT INCLUDE:
- Model names (gpt-5, claude, grok, etc.)
- System setup information
- Generic phrases like \"user initiated a chat\"

If the conversation has no meaningful coding task, respond with just: \"No actionable content\"

Output ONLY the summary, nothing else.

Messages:
{messages_json}"
        ),
    }
}

/// Produces bounded summaries through a completion backend and screens inputs and outputs.
#[derive(Debug, Clone)]
pub struct SummaryEngine<C> {
    client: C,
    policy: BoilerplatePolicy,
    model: String,
    timeout_ms: u64,
}

impl<C: CompletionClient> SummaryEngine<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            policy: BoilerplatePolicy::default(),
            model: model.into(),
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
        }
    }

    pub fn with_policy(mut self, policy: BoilerplatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn policy(&self) -> &BoilerplatePolicy {
        &self.policy
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns `None` for empty input and for any completion failure; failures are logged,
    /// never raised.
    pub fn summarize(
        &self,
        messages: &[Message],
        prior_summary: Option<&str>,
        max_words: usize,
    ) -> Option<String> {
        if messages.is_empty() {
            return None;
        }
        let prompt = build_summary_prompt(messages, max_words, prior_summary);
        let request =
            CompletionRequest::new(prompt, self.model.as_str()).with_timeout_ms(self.timeout_ms);
        let reply = match self.client.complete(&request) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(model = %self.model, %error, "summary completion failed");
                return None;
            }
        };
        let reply = reply.trim();
        if reply.is_empty() {
            return None;
        }
        if word_count(reply) > max_words {
            debug!(max_words, "truncating long summary");
            return Some(truncate_words(reply, max_words));
        }
        Some(reply.to_string())
    }

    pub fn is_actionable(&self, summary: &str) -> bool {
        word_count(summary) >= MIN_SUMMARY_WORDS
            && count_alphabetic(summary) >= MIN_SUMMARY_ALPHABETIC
            && !self.policy.contains_non_actionable_phrase(summary)
    }

    /// Screens extracted messages before any completion call is spent on them.
    pub fn has_meaningful_messages(&self, messages: &[Message]) -> bool {
        if messages.is_empty() {
            return false;
        }
        let combined = messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<String>();
        !self.policy.is_meta_chat(&combined)
            && combined.chars().count() >= MIN_CONTENT_CHARS
            && count_alphabetic(&combined) >= MIN_CONTENT_ALPHABETIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_ai::CompletionError;
    use lens_chats::MessageRole;
    use std::cell::RefCell;

    struct ScriptedClient {
        reply: Result<String, ()>,
        requests: RefCell<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.requests.borrow_mut().push(request.clone());
            self.reply
                .clone()
                .map_err(|_| CompletionError::Timeout { timeout_ms: 1 })
        }
    }

    fn message(role: MessageRole, text: &str) -> Message {
        Message {
            role,
            text: text.to_string(),
            source_blob_id: "b".to_string(),
        }
    }

    #[test]
    fn unit_trim_prompt_messages_previews_overflowing_long_message() {
        let messages = vec![
            message(MessageRole::User, &"a".repeat(50)),
            message(MessageRole::Assistant, &"b".repeat(300)),
            message(MessageRole::User, "never reached"),
        ];
        let trimmed = trim_prompt_messages(&messages, 120);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].content, "a".repeat(50));
        assert_eq!(trimmed[1].content, format!("{}... [trimmed]", "b".repeat(200)));
    }

    #[test]
    fn unit_trim_prompt_messages_drops_short_overflowing_message() {
        let messages = vec![
            message(MessageRole::User, &"a".repeat(50)),
            message(MessageRole::Assistant, &"b".repeat(150)),
        ];
        let trimmed = trim_prompt_messages(&messages, 120);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn functional_fresh_and_update_prompts_embed_pretty_json() {
        let messages = vec![message(MessageRole::User, "Fix the login bug in auth.py")];
        let fresh = build_summary_prompt(&messages, 70, None);
        assert!(fresh.starts_with("Summarize this coding chat in 70 words or less."));
        assert!(fresh.contains("\"No actionable content\""));
        assert!(fresh.contains("Messages:\n[\n  {\n    \"role\": \"user\",\n    \"content\": \"Fix the login bug in auth.py\"\n  }\n]"));

        let update = build_summary_prompt(&messages, 40, Some("Earlier work on auth."));
        assert!(update.starts_with("Update this chat summary with new messages. Max 40 words."));
        assert!(update.contains("EXISTING SUMMARY:\nEarlier work on auth.\n\nNEW MESSAGES:\n["));
        assert!(update.ends_with("Output ONLY the updated summary."));

        let blank_prior = build_summary_prompt(&messages, 70, Some("   "));
        assert_eq!(blank_prior, fresh);
    }

    #[test]
    fn functional_summarize_truncates_long_replies_and_uses_model() {
        let client = ScriptedClient::replying(" one two three four five six ");
        let engine = SummaryEngine::new(&client, "grok").with_timeout_ms(1_234);
        let summary = engine
            .summarize(&[message(MessageRole::User, "Refactor the cache")], None, 4)
            .expect("summary");
        assert_eq!(summary, "one two three four...");

        let requests = client.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "grok");
        assert_eq!(requests[0].timeout_ms, 1_234);
    }

    #[test]
    fn regression_summarize_returns_none_on_failure_blank_or_empty_input() {
        let failing = ScriptedClient::failing();
        let engine = SummaryEngine::new(&failing, "grok");
        assert_eq!(
            engine.summarize(&[message(MessageRole::User, "Refactor the cache")], None, 70),
            None
        );

        let blank = ScriptedClient::replying("   ");
        let engine = SummaryEngine::new(&blank, "grok");
        assert_eq!(
            engine.summarize(&[message(MessageRole::User, "Refactor the cache")], None, 70),
            None
        );
        assert_eq!(engine.summarize(&[], None, 70), None);
        assert_eq!(blank.requests.borrow().len(), 1);
    }

    #[test]
    fn unit_is_actionable_thresholds() {
        let engine = SummaryEngine::new(ScriptedClient::replying(""), "grok");
        assert!(!engine.is_actionable("No actionable content"));
        assert!(engine.is_actionable(
            "Implemented password hashing fix within authentication module using bcrypt library today"
        ));
        assert!(!engine.is_actionable("Fixed a bug."));
        assert!(!engine.is_actionable("a1 b2 c3 d4 e5 f6 g7 h8 i9 j0 k1 l2"));
        assert!(!engine.is_actionable(
            "Mostly testing whether the authentication module compiles and runs correctly today"
        ));
    }

    #[test]
    fn unit_has_meaningful_messages_rejects_meta_chats_and_thin_content() {
        let engine = SummaryEngine::new(ScriptedClient::replying(""), "grok");
        let prose = "Investigated the flaky payment webhook retries and added idempotency keys to the handler.";
        assert!(engine.has_meaningful_messages(&[
            message(MessageRole::User, prose),
            message(MessageRole::Assistant, "Added a unique constraint on event ids."),
        ]));
        assert!(!engine.has_meaningful_messages(&[]));
        assert!(!engine.has_meaningful_messages(&[message(MessageRole::User, "short question here")]));
        assert!(!engine.has_meaningful_messages(&[message(
            MessageRole::User,
            &format!("Summarize this coding chat in 70 words or less. {prose}")
        )]));
        assert!(!engine.has_meaningful_messages(&[message(MessageRole::Tool, &"1234 5678 ".repeat(20))]));
    }
}
