//! Incremental chat summarization.
//!
//! `engine` wraps the completion call with prompt building and quality screening, `updater`
//! decides per conversation whether anything needs summarizing, `store` persists the results
//! and `backfill` drives the updater over every discovered conversation.
mod backfill;
mod engine;
mod store;
mod updater;

pub use backfill::{
    BackfillEvent, BackfillOptions, BackfillPlan, BackfillRunner, BackfillStats,
    DRY_RUN_PREVIEW_LIMIT,
};
pub use engine::{
    build_summary_prompt, trim_prompt_messages, PromptMessage, SummaryEngine,
    DEFAULT_SUMMARY_MAX_WORDS, PROMPT_BUDGET_CHARS,
};
pub use store::{
    InMemorySummaryStore, SqliteSummaryStore, StoreResult, SummaryRecord, SummaryStore,
    SummaryStoreError, SummaryUpsert,
};
pub use updater::{
    plan_update, ConversationInput, IncrementalUpdater, SkipReason, UpdateDecision, UpdateError,
    UpdateOutcome,
};
