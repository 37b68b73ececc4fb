use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn env_filter(debug: bool) -> EnvFilter {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

pub(crate) fn init_tracing(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Hook stdout carries the reply, so debug output goes to an append-only log file.
pub(crate) fn init_hook_tracing(debug: bool, log_path: &Path) -> Result<()> {
    if !debug {
        init_tracing(false);
        return Ok(());
    }
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open hook log {}", log_path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(true))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}
