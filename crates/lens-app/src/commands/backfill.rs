use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use lens_ai::CompletionClient;
use lens_cli::BackfillArgs;
use lens_core::truncate_chars;
use lens_summary::{BackfillOptions, BackfillRunner, BackfillStats, SummaryStore};

use super::{build_agent_client, build_updater, chat_discovery, open_summary_store};
use crate::config::AppContext;

const ID_PREVIEW_CHARS: usize = 12;

pub(crate) fn execute_backfill_command(context: &AppContext, args: &BackfillArgs) -> Result<()> {
    let client = build_agent_client(context)?;
    let store = open_summary_store(context)?;
    let mut stdout = std::io::stdout().lock();
    run_backfill(context, client, &store, args, &mut stdout)?;
    Ok(())
}

pub(crate) fn run_backfill<C, S, W>(
    context: &AppContext,
    client: C,
    store: &S,
    args: &BackfillArgs,
    output: &mut W,
) -> Result<BackfillStats>
where
    C: CompletionClient,
    S: SummaryStore,
    W: Write,
{
    writeln!(output, "Discovering chats...")?;
    let chats = chat_discovery(context)
        .discover()
        .context("failed to discover chats")?;
    writeln!(output, "  Found {} total chats", chats.len())?;

    let options = BackfillOptions {
        limit: args.limit,
        delay: Duration::from_millis(args.delay_ms),
        refresh: args.refresh,
    };
    let updater = build_updater(client, context);
    let runner = BackfillRunner::new(&updater, store);
    let plan = runner.plan(chats, &options);
    writeln!(
        output,
        "  {} chats need processing ({} already summarized, {} with unknown workspace)",
        plan.pending.len(),
        plan.stats.skipped_exists,
        plan.stats.skipped_unknown_workspace
    )?;
    if let Some(limit) = options.limit {
        writeln!(output, "  Limited to {limit} chats")?;
    }

    if args.dry_run {
        writeln!(
            output,
            "\n[DRY RUN] Would process {} chats:",
            plan.pending.len()
        )?;
        for (offset, chat) in plan.preview().iter().enumerate() {
            let workspace = chat
                .workspace
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "Unknown path".to_string());
            writeln!(
                output,
                "  {}. {}... - {workspace}",
                offset + 1,
                truncate_chars(&chat.conversation_id, ID_PREVIEW_CHARS)
            )?;
        }
        let hidden = plan.pending.len().saturating_sub(plan.preview().len());
        if hidden > 0 {
            writeln!(output, "  ... and {hidden} more")?;
        }
        return Ok(plan.stats);
    }

    writeln!(output, "\nProcessing {} chats...", plan.pending.len())?;
    let mut write_error = None;
    let stats = runner.run(plan, &options, |event| {
        let id = truncate_chars(&event.chat.conversation_id, ID_PREVIEW_CHARS);
        let line = match &event.result {
            Ok(outcome) => format!(
                "  [{}/{}] {id}... - {}",
                event.index,
                event.total,
                outcome.label()
            ),
            Err(error) => format!("  [{}/{}] {id}... - FAILED: {error}", event.index, event.total),
        };
        if write_error.is_none() {
            write_error = writeln!(output, "{line}").err();
        }
    });
    if let Some(error) = write_error {
        return Err(error).context("failed to write backfill progress");
    }
    write_stats(output, &stats)?;
    Ok(stats)
}

fn write_stats<W: Write>(output: &mut W, stats: &BackfillStats) -> Result<()> {
    let rows = [
        ("Total chats", stats.total),
        ("Processed", stats.processed),
        ("Updated", stats.updated),
        ("Unchanged", stats.unchanged),
        ("Skipped (already summarized)", stats.skipped_exists),
        ("Skipped (unknown workspace)", stats.skipped_unknown_workspace),
        ("Skipped (no messages)", stats.skipped_no_messages),
        ("Skipped (not meaningful)", stats.skipped_not_meaningful),
        ("Skipped (not actionable)", stats.skipped_not_actionable),
        ("Skipped (no summary)", stats.skipped_no_summary),
        ("Skipped (skip rule)", stats.skipped_skip_rule),
        ("Failed", stats.failed),
    ];
    writeln!(output, "\nBackfill complete:")?;
    for (label, count) in rows {
        writeln!(output, "  {label}: {count}")?;
    }
    Ok(())
}
