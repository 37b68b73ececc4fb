//! CLI argument models for the `chatlens` binary.
//!
//! Exposes the clap-backed command tree and the small value parsers it relies on; dispatch
//! lives in the application crate.

pub mod cli_args;

pub use cli_args::{BackfillArgs, Cli, CliCommand, SearchArgs, CONFIG_PATH_ENV};
