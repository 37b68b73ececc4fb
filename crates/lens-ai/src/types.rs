use std::time::Duration;

use thiserror::Error;

/// Default bound on a single completion call.
pub const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One prompt sent to the completion backend.
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `CompletionError` values.
pub enum CompletionError {
    #[error("invalid completion config: {0}")]
    InvalidConfig(String),
    #[error("completion executable '{0}' is not available")]
    ExecutableUnavailable(String),
    #[error("failed to spawn completion executable '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("completion timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("completion process failed: {0}")]
    Process(#[from] std::io::Error),
    #[error("completion failed with status {status}: {summary}")]
    NonZeroExit { status: String, summary: String },
    #[error("completion returned empty output")]
    EmptyOutput,
}

/// Trait contract for the opaque `complete(prompt) -> text | failure` call.
///
/// Implementations block until the backend answers or the request timeout expires.
/// Callers must not assume determinism or idempotency.
pub trait CompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

impl<T: CompletionClient + ?Sized> CompletionClient for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

impl<T: CompletionClient + ?Sized> CompletionClient for Box<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}
