//! Batch summarization over every discovered conversation.

use std::thread;
use std::time::Duration;

use lens_ai::CompletionClient;
use lens_chats::ChatLocation;
use tracing::{info, warn};

use crate::store::SummaryStore;
use crate::updater::{IncrementalUpdater, SkipReason, UpdateOutcome};

/// Number of pending conversations listed by a dry run.
pub const DRY_RUN_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillOptions {
    pub limit: Option<usize>,
    /// Pause after each written summary, except the last.
    pub delay: Duration,
    /// Re-run summarized conversations too; they update incrementally or stay unchanged.
    pub refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub total: usize,
    pub pending: usize,
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_exists: usize,
    pub skipped_unknown_workspace: usize,
    pub skipped_no_messages: usize,
    pub skipped_not_meaningful: usize,
    pub skipped_not_actionable: usize,
    pub skipped_no_summary: usize,
    pub skipped_skip_rule: usize,
    pub failed: usize,
}

impl BackfillStats {
    fn record(&mut self, outcome: &UpdateOutcome) {
        match outcome {
            UpdateOutcome::Created => self.processed += 1,
            UpdateOutcome::Updated => self.updated += 1,
            UpdateOutcome::Unchanged => self.unchanged += 1,
            UpdateOutcome::NoMessages => self.skipped_no_messages += 1,
            UpdateOutcome::NotMeaningful => self.skipped_not_meaningful += 1,
            UpdateOutcome::NoSummary => self.skipped_no_summary += 1,
            UpdateOutcome::NotActionable => self.skipped_not_actionable += 1,
            UpdateOutcome::Skipped(SkipReason::SkipRule) => self.skipped_skip_rule += 1,
            UpdateOutcome::Skipped(SkipReason::AlreadySummarized) => self.skipped_exists += 1,
            UpdateOutcome::Skipped(SkipReason::UnknownWorkspace) => {
                self.skipped_unknown_workspace += 1
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Conversations selected for a run, after workspace, existence and limit filtering.
pub struct BackfillPlan {
    pub pending: Vec<ChatLocation>,
    pub stats: BackfillStats,
}

impl BackfillPlan {
    pub fn preview(&self) -> &[ChatLocation] {
        &self.pending[..self.pending.len().min(DRY_RUN_PREVIEW_LIMIT)]
    }
}

#[derive(Debug)]
/// Progress report for one conversation of a run.
pub struct BackfillEvent<'a> {
    /// 1-based position within the pending list.
    pub index: usize,
    pub total: usize,
    pub chat: &'a ChatLocation,
    pub result: Result<&'a UpdateOutcome, String>,
}

pub struct BackfillRunner<'a, C, S> {
    updater: &'a IncrementalUpdater<C>,
    store: &'a S,
}

impl<'a, C: CompletionClient, S: SummaryStore> BackfillRunner<'a, C, S> {
    pub fn new(updater: &'a IncrementalUpdater<C>, store: &'a S) -> Self {
        Self { updater, store }
    }

    /// Filters discovered chats down to the ones a run should visit. A chat whose existence
    /// check fails is counted as failed and left out.
    pub fn plan(&self, chats: Vec<ChatLocation>, options: &BackfillOptions) -> BackfillPlan {
        let mut stats = BackfillStats {
            total: chats.len(),
            ..BackfillStats::default()
        };
        let mut pending = Vec::new();
        for chat in chats {
            if chat.workspace.is_none() {
                stats.record(&UpdateOutcome::Skipped(SkipReason::UnknownWorkspace));
                continue;
            }
            if !options.refresh {
                match self.store.contains(&chat.conversation_id) {
                    Ok(false) => {}
                    Ok(true) => {
                        stats.record(&UpdateOutcome::Skipped(SkipReason::AlreadySummarized));
                        continue;
                    }
                    Err(error) => {
                        stats.failed += 1;
                        warn!(
                            conversation_id = %chat.conversation_id,
                            %error,
                            "could not check existing summary"
                        );
                        continue;
                    }
                }
            }
            pending.push(chat);
        }
        if let Some(limit) = options.limit {
            pending.truncate(limit);
        }
        stats.pending = pending.len();
        info!(
            total = stats.total,
            pending = stats.pending,
            skipped_exists = stats.skipped_exists,
            skipped_unknown_workspace = stats.skipped_unknown_workspace,
            failed = stats.failed,
            "backfill planned"
        );
        BackfillPlan { pending, stats }
    }

    /// Runs the updater over every pending conversation. Errors are counted, never fatal.
    pub fn run(
        &self,
        plan: BackfillPlan,
        options: &BackfillOptions,
        mut on_event: impl FnMut(BackfillEvent<'_>),
    ) -> BackfillStats {
        let BackfillPlan { pending, mut stats } = plan;
        let total = pending.len();
        for (offset, chat) in pending.iter().enumerate() {
            let index = offset + 1;
            match self.updater.run_store(
                &chat.conversation_id,
                &chat.store_path,
                chat.workspace.as_deref(),
                self.store,
            ) {
                Ok(outcome) => {
                    stats.record(&outcome);
                    on_event(BackfillEvent {
                        index,
                        total,
                        chat,
                        result: Ok(&outcome),
                    });
                    if outcome.wrote_summary() && index < total && !options.delay.is_zero() {
                        thread::sleep(options.delay);
                    }
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(
                        conversation_id = %chat.conversation_id,
                        %error,
                        "backfill failed for conversation"
                    );
                    on_event(BackfillEvent {
                        index,
                        total,
                        chat,
                        result: Err(error.to_string()),
                    });
                }
            }
        }
        info!(
            processed = stats.processed,
            updated = stats.updated,
            failed = stats.failed,
            "backfill complete"
        );
        stats
    }
}
