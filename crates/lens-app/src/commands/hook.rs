use std::io::Read;
use std::path::Path;

use anyhow::Result;
use lens_ai::{CompletionClient, SKIP_HOOKS_ENV};
use lens_summary::UpdateOutcome;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{build_agent_client, build_updater, chat_discovery, open_summary_store};
use crate::bootstrap_helpers::init_hook_tracing;
use crate::config::{load_app_context, AppContext};

/// The only thing a hook ever writes to stdout; the agent must never be blocked.
pub(crate) const HOOK_CONTINUE_REPLY: &str = r#"{"continue":true}"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HookPayload {
    hook_event_name: Option<String>,
    conversation_id: Option<String>,
    workspace_roots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HookDisposition {
    Skipped(&'static str),
    Completed(UpdateOutcome),
}

fn hooks_skipped_by_env() -> bool {
    std::env::var(SKIP_HOOKS_ENV).is_ok_and(|value| value == "1")
}

pub(crate) fn execute_hook_command(config_path: Option<&Path>) -> Result<()> {
    let mut raw = String::new();
    if let Err(error) = std::io::stdin().read_to_string(&mut raw) {
        eprintln!("chatlens hook: failed to read stdin: {error}");
        raw.clear();
    }
    if !hooks_skipped_by_env() {
        match load_app_context(config_path) {
            Ok(context) => run_hook(&raw, &context),
            Err(error) => eprintln!("chatlens hook: {error:#}"),
        }
    }
    println!("{HOOK_CONTINUE_REPLY}");
    Ok(())
}

fn run_hook(raw: &str, context: &AppContext) {
    if let Err(error) = init_hook_tracing(context.config.debug, &context.hook_log_path()) {
        eprintln!("chatlens hook: {error:#}");
    }
    let result =
        build_agent_client(context).and_then(|client| handle_hook_payload(raw, context, client));
    match result {
        Ok(HookDisposition::Skipped(reason)) => debug!(reason, "hook skipped"),
        Ok(HookDisposition::Completed(outcome)) => {
            debug!(outcome = %outcome.label(), "hook finished")
        }
        Err(error) => warn!(error = %format!("{error:#}"), "hook failed"),
    }
}

/// Processes one stop-hook payload against the configured stores.
pub(crate) fn handle_hook_payload<C: CompletionClient>(
    raw: &str,
    context: &AppContext,
    client: C,
) -> Result<HookDisposition> {
    if !context.config.hooks_enabled {
        return Ok(HookDisposition::Skipped("hooks disabled"));
    }
    if raw.trim().is_empty() {
        return Ok(HookDisposition::Skipped("empty payload"));
    }
    let payload = match serde_json::from_str::<HookPayload>(raw) {
        Ok(payload) => payload,
        Err(error) => {
            debug!(%error, "hook payload is not valid JSON");
            return Ok(HookDisposition::Skipped("invalid payload"));
        }
    };
    debug!(
        event = payload.hook_event_name.as_deref().unwrap_or("unknown"),
        conversation_id = payload.conversation_id.as_deref().unwrap_or_default(),
        roots = ?payload.workspace_roots,
        "hook payload received"
    );

    let Some(conversation_id) = payload
        .conversation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Ok(HookDisposition::Skipped("missing conversation id"));
    };
    // IDE chats and chats not yet persisted have no store.
    let Some(store_path) = chat_discovery(context).find_store(conversation_id) else {
        debug!(conversation_id, "chat store not found");
        return Ok(HookDisposition::Skipped("chat store not found"));
    };
    let workspace = payload
        .workspace_roots
        .first()
        .map(|root| root.trim())
        .filter(|root| !root.is_empty())
        .map(Path::new);

    let summaries = open_summary_store(context)?;
    let outcome = build_updater(client, context).run_store(
        conversation_id,
        &store_path,
        workspace,
        &summaries,
    )?;
    Ok(HookDisposition::Completed(outcome))
}
