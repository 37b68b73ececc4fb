use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lens_chats::{BoilerplatePolicy, NamedChatSkipRule};
use lens_core::save_json_atomic;
use serde::{Deserialize, Serialize};

const CURSOR_DIR_NAME: &str = ".cursor";
const CONFIG_DIR_NAME: &str = "chatlens";
const CONFIG_FILE_NAME: &str = "config.json";
const SUMMARY_DB_FILE_NAME: &str = "summary.db";
const HOOK_LOG_FILE_NAME: &str = "hook.log";
const CHATS_DIR_NAME: &str = "chats";
const PROJECTS_DIR_NAME: &str = "projects";

// 2026-01-01 in ms; earlier CLI builds named every chat "New Agent".
const NEW_AGENT_CUTOFF_MS: u64 = 1_767_205_800_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LensConfig {
    pub summary_model: String,
    pub search_model: String,
    pub summary_max_words: usize,
    pub search_window_days: u64,
    /// Relative paths resolve against the config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_db_path: Option<PathBuf>,
    pub hooks_enabled: bool,
    pub debug: bool,
    pub agent_executable: String,
    pub completion_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chats_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects_root: Option<PathBuf>,
    pub skip_named_chats: Vec<NamedChatSkipRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boilerplate: Option<BoilerplatePolicy>,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            summary_model: "grok".to_string(),
            search_model: "grok".to_string(),
            summary_max_words: 70,
            search_window_days: 20,
            summary_db_path: None,
            hooks_enabled: true,
            debug: false,
            agent_executable: "cursor".to_string(),
            completion_timeout_ms: 60_000,
            chats_root: None,
            projects_root: None,
            skip_named_chats: vec![NamedChatSkipRule {
                name: "New Agent".to_string(),
                created_at_or_after_ms: NEW_AGENT_CUTOFF_MS,
            }],
            boilerplate: None,
        }
    }
}

impl LensConfig {
    fn validate(&self, path: &Path) -> Result<()> {
        if self.summary_max_words == 0 {
            bail!("summary_max_words must be greater than 0 in {}", path.display());
        }
        if self.completion_timeout_ms == 0 {
            bail!(
                "completion_timeout_ms must be greater than 0 in {}",
                path.display()
            );
        }
        if self.agent_executable.trim().is_empty() {
            bail!("agent_executable must not be empty in {}", path.display());
        }
        Ok(())
    }
}

/// Loaded config plus every path it implies, resolved once at startup.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub config: LensConfig,
    pub config_dir: PathBuf,
    pub summary_db_path: PathBuf,
    pub chats_root: PathBuf,
    pub projects_root: PathBuf,
}

impl AppContext {
    pub(crate) fn hook_log_path(&self) -> PathBuf {
        self.config_dir.join(HOOK_LOG_FILE_NAME)
    }

    pub(crate) fn boilerplate_policy(&self) -> BoilerplatePolicy {
        self.config.boilerplate.clone().unwrap_or_default()
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("failed to resolve the home directory")
}

pub(crate) fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?
        .join(CURSOR_DIR_NAME)
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

/// Reads the config at `path`, writing the defaults there first when the file is missing.
pub(crate) fn load_or_init_config(path: &Path) -> Result<LensConfig> {
    if !path.exists() {
        let config = LensConfig::default();
        save_json_atomic(path, &config)
            .with_context(|| format!("failed to write default config {}", path.display()))?;
        return Ok(config);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str::<LensConfig>(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate(path)?;
    Ok(config)
}

pub(crate) fn load_app_context(explicit_path: Option<&Path>) -> Result<AppContext> {
    let config_path = match explicit_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    let config = load_or_init_config(&config_path)?;
    resolve_app_context(config, &config_path, dirs::home_dir().as_deref())
}

fn resolve_app_context(
    config: LensConfig,
    config_path: &Path,
    home: Option<&Path>,
) -> Result<AppContext> {
    let config_dir = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let summary_db_path = match &config.summary_db_path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => config_dir.join(path),
        None => config_dir.join(SUMMARY_DB_FILE_NAME),
    };
    let cursor_root = || {
        home.map(|home| home.join(CURSOR_DIR_NAME))
            .context("failed to resolve the home directory for chat roots")
    };
    let chats_root = match &config.chats_root {
        Some(path) => path.clone(),
        None => cursor_root()?.join(CHATS_DIR_NAME),
    };
    let projects_root = match &config.projects_root {
        Some(path) => path.clone(),
        None => cursor_root()?.join(PROJECTS_DIR_NAME),
    };
    Ok(AppContext {
        config,
        config_dir,
        summary_db_path,
        chats_root,
        projects_root,
    })
}
