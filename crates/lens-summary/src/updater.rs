//! Per-conversation update state machine.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use lens_ai::CompletionClient;
use lens_chats::{
    BlobRecord, ChatMeta, ChatStore, ChatStoreError, ContentExtractor, NamedChatSkipRule,
};
use lens_core::current_unix_timestamp_ms;
use thiserror::Error;
use tracing::debug;

use crate::engine::{SummaryEngine, DEFAULT_SUMMARY_MAX_WORDS};
use crate::store::{SummaryRecord, SummaryStore, SummaryStoreError, SummaryUpsert};

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a run must do for a conversation, derived from stored coverage and current blobs.
pub enum UpdateDecision {
    FirstSummary,
    Unchanged,
    IncrementalUpdate { delta_ids: BTreeSet<String> },
}

/// Compares the stored coverage with the blob ids currently in the conversation store.
pub fn plan_update(existing: Option<&SummaryRecord>, blobs: &[BlobRecord]) -> UpdateDecision {
    let Some(existing) = existing else {
        return UpdateDecision::FirstSummary;
    };
    let delta_ids = blobs
        .iter()
        .filter(|blob| !existing.covered_blob_ids.contains(&blob.id))
        .map(|blob| blob.id.clone())
        .collect::<BTreeSet<_>>();
    if delta_ids.is_empty() {
        UpdateDecision::Unchanged
    } else {
        UpdateDecision::IncrementalUpdate { delta_ids }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A configured named-chat rule matched the chat meta.
    SkipRule,
    /// Backfill without refresh leaves summarized conversations alone.
    AlreadySummarized,
    /// No project folder decodes to this conversation's workspace.
    UnknownWorkspace,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SkipRule => "skip rule",
            Self::AlreadySummarized => "already summarized",
            Self::UnknownWorkspace => "unknown workspace",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of one updater run. Everything except `Created` and `Updated` leaves the store
/// untouched.
pub enum UpdateOutcome {
    Created,
    Updated,
    Unchanged,
    NoMessages,
    NotMeaningful,
    NoSummary,
    NotActionable,
    Skipped(SkipReason),
}

impl UpdateOutcome {
    pub fn wrote_summary(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Created => "created".to_string(),
            Self::Updated => "updated".to_string(),
            Self::Unchanged => "unchanged".to_string(),
            Self::NoMessages => "skipped (no messages)".to_string(),
            Self::NotMeaningful => "skipped (not meaningful)".to_string(),
            Self::NoSummary => "skipped (no summary)".to_string(),
            Self::NotActionable => "skipped (not actionable)".to_string(),
            Self::Skipped(reason) => format!("skipped ({reason})"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    ChatStore(#[from] ChatStoreError),
    #[error(transparent)]
    SummaryStore(#[from] SummaryStoreError),
}

#[derive(Debug, Clone, Copy)]
/// Everything the updater needs to know about one conversation.
pub struct ConversationInput<'a> {
    pub conversation_id: &'a str,
    pub meta: Option<&'a ChatMeta>,
    pub workspace: Option<&'a Path>,
    pub blobs: &'a [BlobRecord],
}

/// Keeps one conversation's summary current without redoing work on covered blobs.
#[derive(Debug, Clone)]
pub struct IncrementalUpdater<C> {
    engine: SummaryEngine<C>,
    max_words: usize,
    skip_rules: Vec<NamedChatSkipRule>,
}

impl<C: CompletionClient> IncrementalUpdater<C> {
    pub fn new(engine: SummaryEngine<C>) -> Self {
        Self {
            engine,
            max_words: DEFAULT_SUMMARY_MAX_WORDS,
            skip_rules: Vec::new(),
        }
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    pub fn with_skip_rules(mut self, skip_rules: Vec<NamedChatSkipRule>) -> Self {
        self.skip_rules = skip_rules;
        self
    }

    pub fn engine(&self) -> &SummaryEngine<C> {
        &self.engine
    }

    fn is_skipped(&self, meta: Option<&ChatMeta>) -> bool {
        meta.is_some_and(|meta| self.skip_rules.iter().any(|rule| rule.matches(meta)))
    }

    /// Reads a conversation store and runs the update against it.
    pub fn run_store<S: SummaryStore>(
        &self,
        conversation_id: &str,
        store_path: &Path,
        workspace: Option<&Path>,
        summaries: &S,
    ) -> Result<UpdateOutcome, UpdateError> {
        let chat_store = ChatStore::open(store_path)?;
        let meta = chat_store.read_meta();
        let blobs = chat_store.list_json_blobs()?;
        self.run(
            ConversationInput {
                conversation_id,
                meta: meta.as_ref(),
                workspace,
                blobs: &blobs,
            },
            summaries,
        )
    }

    pub fn run<S: SummaryStore>(
        &self,
        input: ConversationInput<'_>,
        summaries: &S,
    ) -> Result<UpdateOutcome, UpdateError> {
        let conversation_id = input.conversation_id;
        if self.is_skipped(input.meta) {
            debug!(conversation_id, "chat matches a skip rule");
            return Ok(UpdateOutcome::Skipped(SkipReason::SkipRule));
        }

        let existing = summaries.get(conversation_id)?;
        let decision = plan_update(existing.as_ref(), input.blobs);
        let extractor = ContentExtractor::new(self.engine.policy());
        let messages = match &decision {
            UpdateDecision::Unchanged => {
                debug!(
                    conversation_id,
                    blobs = input.blobs.len(),
                    "no new blobs since last summary"
                );
                return Ok(UpdateOutcome::Unchanged);
            }
            UpdateDecision::FirstSummary => {
                debug!(
                    conversation_id,
                    blobs = input.blobs.len(),
                    "first summary"
                );
                extractor.extract(input.blobs)
            }
            UpdateDecision::IncrementalUpdate { delta_ids } => {
                debug!(
                    conversation_id,
                    new_blobs = delta_ids.len(),
                    blobs = input.blobs.len(),
                    "incremental update"
                );
                extractor.extract(
                    input
                        .blobs
                        .iter()
                        .filter(|blob| delta_ids.contains(&blob.id)),
                )
            }
        };

        if messages.is_empty() {
            debug!(conversation_id, "no messages extracted");
            return Ok(UpdateOutcome::NoMessages);
        }
        if !self.engine.has_meaningful_messages(&messages) {
            debug!(conversation_id, "messages not meaningful");
            return Ok(UpdateOutcome::NotMeaningful);
        }

        let prior = existing.as_ref().map(|record| record.summary_text.as_str());
        let Some(summary) = self.engine.summarize(&messages, prior, self.max_words) else {
            debug!(conversation_id, "no summary produced");
            return Ok(UpdateOutcome::NoSummary);
        };
        if !self.engine.is_actionable(&summary) {
            debug!(conversation_id, "summary not actionable");
            return Ok(UpdateOutcome::NotActionable);
        }

        let mut covered_blob_ids = input
            .blobs
            .iter()
            .map(|blob| blob.id.clone())
            .collect::<BTreeSet<_>>();
        if let Some(existing) = &existing {
            covered_blob_ids.extend(existing.covered_blob_ids.iter().cloned());
        }
        let chat_directory = input
            .workspace
            .map(|workspace| workspace.display().to_string())
            .or_else(|| {
                existing
                    .as_ref()
                    .and_then(|record| record.chat_directory.clone())
            });
        let chat_name = input
            .meta
            .map(|meta| meta.display_name().to_string())
            .unwrap_or_else(|| ChatMeta::default().display_name().to_string());

        summaries.upsert(
            SummaryUpsert {
                conversation_id: conversation_id.to_string(),
                summary_text: summary,
                covered_blob_ids,
                chat_name: Some(chat_name),
                chat_directory,
            },
            current_unix_timestamp_ms(),
        )?;

        Ok(if existing.is_some() {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::Created
        })
    }
}
