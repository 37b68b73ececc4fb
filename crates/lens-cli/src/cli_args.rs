use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "CHATLENS_CONFIG";

const DEFAULT_MAX_RESULTS: usize = 3;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty_text(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("value must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "chatlens",
    about = "Summarize, search and resume past agent chats",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_PATH_ENV,
        help = "Path to the chatlens config file. Defaults to ~/.cursor/chatlens/config.json."
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Find a past chat by description and resume it.
    Search(SearchArgs),
    /// Summarize every discovered chat that has no summary yet.
    Backfill(BackfillArgs),
    /// Stop-hook entrypoint; reads the hook payload from stdin.
    Hook,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SearchArgs {
    #[arg(
        short = 'd',
        long,
        value_parser = parse_non_empty_text,
        help = "What the chat you are looking for was about."
    )]
    pub description: String,

    #[arg(
        short = 's',
        long,
        help = "Rank with the completion model instead of keyword matching."
    )]
    pub smart: bool,

    #[arg(
        long = "max-results",
        default_value_t = DEFAULT_MAX_RESULTS,
        value_parser = parse_positive_usize,
        help = "Maximum number of results to show."
    )]
    pub max_results: usize,

    #[arg(long = "no-resume", help = "Print results without prompting to resume a chat.")]
    pub no_resume: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct BackfillArgs {
    #[arg(long = "dry-run", help = "List pending chats without summarizing them.")]
    pub dry_run: bool,

    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Process at most this many pending chats."
    )]
    pub limit: Option<usize>,

    #[arg(
        long = "delay-ms",
        default_value_t = 0,
        help = "Pause between successful summaries, in milliseconds."
    )]
    pub delay_ms: u64,

    #[arg(
        long,
        help = "Also revisit chats that already have a summary and fold in new messages."
    )]
    pub refresh: bool,
}
