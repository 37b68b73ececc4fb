use std::fs::Metadata;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::types::{CompletionClient, CompletionError, CompletionRequest};

/// Set to `1` in the environment of every agent invocation so the agent's own hooks do not
/// recurse into chatlens.
pub const SKIP_HOOKS_ENV: &str = "CHATLENS_SKIP_HOOKS";

const DEFAULT_AGENT_EXECUTABLE: &str = "cursor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCliConfig {
    pub executable: String,
}

impl Default for AgentCliConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_AGENT_EXECUTABLE.to_string(),
        }
    }
}

/// Runs `<executable> agent -p --model <model> <prompt>` and returns trimmed stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCliClient {
    config: AgentCliConfig,
}

impl AgentCliClient {
    pub fn new(config: AgentCliConfig) -> Result<Self, CompletionError> {
        if config.executable.trim().is_empty() {
            return Err(CompletionError::InvalidConfig(
                "agent executable is empty".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn executable(&self) -> &str {
        &self.config.executable
    }

    /// Locates the configured agent binary, searching `PATH` for bare names.
    pub fn resolve_executable(&self) -> Result<PathBuf, CompletionError> {
        let configured = self.config.executable.trim();
        let path_var = std::env::var_os("PATH");
        resolve_on_path(configured, path_var.as_deref())
            .ok_or_else(|| CompletionError::ExecutableUnavailable(configured.to_string()))
    }

    fn build_command(&self, program: &Path, request: &CompletionRequest) -> Command {
        let mut command = Command::new(program);
        command.args(["agent", "-p", "--model"]);
        command.arg(&request.model);
        command.arg(&request.prompt);
        command.env(SKIP_HOOKS_ENV, "1");
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command
    }
}

#[cfg(unix)]
fn is_runnable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_runnable(metadata: &Metadata) -> bool {
    metadata.is_file()
}

fn runnable_path(candidate: PathBuf) -> Option<PathBuf> {
    let metadata = std::fs::metadata(&candidate).ok()?;
    is_runnable(&metadata).then_some(candidate)
}

// A name with a directory part is taken as-is; a bare name is looked up in `path_var` order.
fn resolve_on_path(executable: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    if executable.is_empty() {
        return None;
    }
    let candidate = Path::new(executable);
    let has_directory = candidate
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if has_directory {
        return runnable_path(candidate.to_path_buf());
    }
    std::env::split_paths(path_var?).find_map(|dir| runnable_path(dir.join(candidate)))
}

fn spawn_with_text_file_busy_retry(
    command: &mut Command,
    executable: &str,
) -> Result<Child, CompletionError> {
    const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
    const TEXT_FILE_BUSY_ERRNO: i32 = 26;
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(error)
                if error.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(25));
            }
            Err(source) => {
                return Err(CompletionError::Spawn {
                    executable: executable.to_string(),
                    source,
                });
            }
        }
    }
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = pipe {
            let _ = reader.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

impl CompletionClient for AgentCliClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let program = self.resolve_executable()?;
        let mut command = self.build_command(&program, request);
        let mut child =
            spawn_with_text_file_busy_retry(&mut command, &program.display().to_string())?;
        // Pipes are drained on threads so a chatty child never blocks on a full pipe.
        let stdout_reader = drain_pipe(child.stdout.take());
        let stderr_reader = drain_pipe(child.stderr.take());

        let status = match child.wait_timeout(request.timeout())? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(
                    executable = %program.display(),
                    timeout_ms = request.timeout_ms,
                    "agent completion timed out"
                );
                return Err(CompletionError::Timeout {
                    timeout_ms: request.timeout_ms,
                });
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            let status = status
                .code()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(CompletionError::NonZeroExit {
                status,
                summary: summarize_process_failure(&stderr, &stdout),
            });
        }

        let text = stdout.trim();
        if text.is_empty() {
            return Err(CompletionError::EmptyOutput);
        }
        Ok(text.to_string())
    }
}

fn summarize_process_failure(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return truncate_for_log(stderr);
    }

    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return truncate_for_log(stdout);
    }

    "no error output".to_string()
}

fn truncate_for_log(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_CHARS).collect::<String>() + "..."
}
