pub(crate) mod backfill;
pub(crate) mod hook;
pub(crate) mod search;

use anyhow::{Context, Result};
use lens_ai::{AgentCliClient, AgentCliConfig, CompletionClient};
use lens_chats::ChatDiscovery;
use lens_summary::{IncrementalUpdater, SqliteSummaryStore, SummaryEngine};

use crate::config::AppContext;

pub(crate) use backfill::execute_backfill_command;
pub(crate) use hook::execute_hook_command;
pub(crate) use search::execute_search_command;

pub(crate) fn build_agent_client(context: &AppContext) -> Result<AgentCliClient> {
    AgentCliClient::new(AgentCliConfig {
        executable: context.config.agent_executable.clone(),
    })
    .context("invalid agent executable configuration")
}

pub(crate) fn build_updater<C: CompletionClient>(
    client: C,
    context: &AppContext,
) -> IncrementalUpdater<C> {
    let engine = SummaryEngine::new(client, context.config.summary_model.as_str())
        .with_policy(context.boilerplate_policy())
        .with_timeout_ms(context.config.completion_timeout_ms);
    IncrementalUpdater::new(engine)
        .with_max_words(context.config.summary_max_words)
        .with_skip_rules(context.config.skip_named_chats.clone())
}

pub(crate) fn open_summary_store(context: &AppContext) -> Result<SqliteSummaryStore> {
    SqliteSummaryStore::new(&context.summary_db_path).with_context(|| {
        format!(
            "failed to open summary database {}",
            context.summary_db_path.display()
        )
    })
}

pub(crate) fn chat_discovery(context: &AppContext) -> ChatDiscovery {
    ChatDiscovery::new(&context.chats_root, &context.projects_root)
}
