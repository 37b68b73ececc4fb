//! Opaque text-completion boundary for chatlens.
//!
//! Summarization and ranking only ever see `CompletionClient::complete`; the agent CLI
//! client is the production implementation and tests substitute scripted stubs.
mod agent_cli_client;
mod types;

pub use agent_cli_client::{AgentCliClient, AgentCliConfig, SKIP_HOOKS_ENV};
pub use types::{
    CompletionClient, CompletionError, CompletionRequest, DEFAULT_COMPLETION_TIMEOUT_MS,
};
