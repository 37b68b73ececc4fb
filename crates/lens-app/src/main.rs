//! `chatlens`: summarize past agent chats, search them by description and resume them.
mod bootstrap_helpers;
mod commands;
mod config;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use lens_cli::{Cli, CliCommand};

use crate::bootstrap_helpers::init_tracing;
use crate::commands::{execute_backfill_command, execute_hook_command, execute_search_command};
use crate::config::{load_app_context, AppContext};

fn load_runtime_context(config_path: Option<&Path>) -> Result<AppContext> {
    let context = load_app_context(config_path)?;
    init_tracing(context.config.debug);
    Ok(context)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    match &cli.command {
        // The hook loads config itself: it must answer even when config is broken.
        CliCommand::Hook => execute_hook_command(config_path),
        CliCommand::Search(args) => {
            let context = load_runtime_context(config_path)?;
            execute_search_command(&context, args)
        }
        CliCommand::Backfill(args) => {
            let context = load_runtime_context(config_path)?;
            execute_backfill_command(&context, args)
        }
    }
}
