use std::io::{BufRead, ErrorKind, Write};
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use lens_ai::CompletionClient;
use lens_cli::SearchArgs;
use lens_core::{current_unix_timestamp_ms, truncate_chars, unix_ms_days_before};
use lens_search::{RankedSummary, Ranker, RankingMode};
use lens_summary::{SummaryRecord, SummaryStore};
use tracing::{debug, warn};

use super::{build_agent_client, open_summary_store};
use crate::config::AppContext;

const SUMMARY_PREVIEW_CHARS: usize = 120;
const DATE_FORMAT: &str = "%b %d, %Y %H:%M";

pub(crate) fn execute_search_command(context: &AppContext, args: &SearchArgs) -> Result<()> {
    let client = build_agent_client(context)?;
    let store = open_summary_store(context)?;
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout().lock();
    let selection = run_search(context, &store, client, args, &mut input, &mut output)?;
    if let Some(record) = selection {
        resume_chat(&context.config.agent_executable, &record, &mut output)?;
    }
    Ok(())
}

/// Ranks recent summaries, prints them and returns the chat the user picked, if any.
pub(crate) fn run_search<C, S, R, W>(
    context: &AppContext,
    store: &S,
    client: C,
    args: &SearchArgs,
    input: &mut R,
    output: &mut W,
) -> Result<Option<SummaryRecord>>
where
    C: CompletionClient,
    S: SummaryStore,
    R: BufRead,
    W: Write,
{
    let window_days = context.config.search_window_days;
    let cutoff_ms = unix_ms_days_before(current_unix_timestamp_ms(), window_days);
    let summaries = store
        .list_recent(cutoff_ms)
        .context("failed to load recent summaries")?;
    debug!(window_days, candidates = summaries.len(), "loaded recent summaries");
    if summaries.is_empty() {
        writeln!(
            output,
            "No chat summaries found in the last {window_days} days. Run `chatlens backfill` or interact with some chats first."
        )?;
        return Ok(None);
    }

    let mode = if args.smart {
        RankingMode::Smart
    } else {
        RankingMode::Keyword
    };
    let ranker = Ranker::new(client, context.config.search_model.as_str())
        .with_timeout_ms(context.config.completion_timeout_ms);
    let ranked = ranker.rank(&args.description, &summaries, args.max_results, mode);
    if ranked.is_empty() {
        writeln!(output, "No relevant chats found for your description.")?;
        return Ok(None);
    }

    write_results(output, &ranked)?;
    if args.no_resume {
        return Ok(None);
    }
    match prompt_selection(ranked.len(), input, output)? {
        Some(index) => Ok(ranked.into_iter().nth(index).map(|entry| entry.record)),
        None => {
            writeln!(output, "No chat selected.")?;
            Ok(None)
        }
    }
}

pub(crate) fn format_created_at(created_at_ms: u64) -> String {
    if created_at_ms == 0 {
        return "Unknown".to_string();
    }
    i64::try_from(created_at_ms)
        .ok()
        .and_then(|millis| Local.timestamp_millis_opt(millis).single())
        .map(|created| created.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn write_results<W: Write>(output: &mut W, ranked: &[RankedSummary]) -> Result<()> {
    writeln!(output, "\nFound {} matching chat(s):\n", ranked.len())?;
    for (offset, entry) in ranked.iter().enumerate() {
        let record = &entry.record;
        writeln!(
            output,
            "[{}] {}",
            offset + 1,
            record.chat_name.as_deref().unwrap_or("Unnamed")
        )?;
        writeln!(
            output,
            "    Dir: {}",
            record.chat_directory.as_deref().unwrap_or("Unknown")
        )?;
        writeln!(output, "    Time: {}", format_created_at(record.created_at_ms))?;
        writeln!(
            output,
            "    {}...",
            truncate_chars(&record.summary_text, SUMMARY_PREVIEW_CHARS)
        )?;
        if !entry.reason.is_empty() {
            writeln!(output, "    Why: {}", entry.reason)?;
        }
        writeln!(output)?;
    }
    Ok(())
}

/// Returns the zero-based index the user chose. End of input counts as no selection.
pub(crate) fn prompt_selection<R: BufRead, W: Write>(
    count: usize,
    input: &mut R,
    output: &mut W,
) -> Result<Option<usize>> {
    if count == 0 {
        return Ok(None);
    }
    if count == 1 {
        write!(output, "Select this chat? [Y/n]: ")?;
    } else {
        write!(output, "Select chat [1-{count}] or q to quit: ")?;
    }
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim().to_lowercase();
    if count == 1 {
        return Ok(matches!(answer.as_str(), "" | "y" | "yes").then_some(0));
    }
    if answer == "q" {
        return Ok(None);
    }
    match answer.parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Ok(Some(choice - 1)),
        _ => {
            writeln!(output, "Invalid selection.")?;
            Ok(None)
        }
    }
}

/// Runs `<executable> agent --resume <id>`, inside the recorded directory when it still exists.
pub(crate) fn resume_chat<W: Write>(
    executable: &str,
    record: &SummaryRecord,
    output: &mut W,
) -> Result<()> {
    let label = record
        .chat_name
        .as_deref()
        .unwrap_or(record.conversation_id.as_str());
    writeln!(output, "\n→ Resuming: {label}")?;

    let mut command = Command::new(executable);
    command.args(["agent", "--resume", record.conversation_id.as_str()]);
    if let Some(directory) = record
        .chat_directory
        .as_deref()
        .map(Path::new)
        .filter(|directory| directory.is_dir())
    {
        command.current_dir(directory);
        writeln!(output, "→ Directory: {}", directory.display())?;
    }
    output.flush()?;

    match command.status() {
        Ok(status) if !status.success() => {
            warn!(executable, %status, "agent exited unsuccessfully");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            writeln!(
                output,
                "Error: '{executable}' command not found. Make sure the agent CLI is installed."
            )?;
            Ok(())
        }
        Err(error) => {
            Err(error).with_context(|| format!("failed to run '{executable}' to resume chat"))
        }
    }
}
