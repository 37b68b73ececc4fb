//! Enumerates persisted conversation stores and pairs each with its workspace.
//!
//! Layout on disk:
//!
//! ```text
//! <chats root>/<md5 of workspace path>/<conversation id>/store.db
//! <projects root>/<encoded workspace path>/
//! ```
//!
//! The hash folder cannot be inverted, so workspaces are recovered by decoding project folder
//! names and hashing the results until one matches.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::chat_store::STORE_FILE_NAME;
use crate::path_codec::{DirectoryProbe, FsProbe, PathCodec};

/// Lower-case hex MD5 of the workspace's absolute path string.
pub fn workspace_hash(path: &Path) -> String {
    format!("{:x}", Md5::digest(path.to_string_lossy().as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One conversation store found on disk.
pub struct ChatLocation {
    pub conversation_id: String,
    /// `None` when no project folder decodes to a path with this hash.
    pub workspace: Option<PathBuf>,
    pub store_path: PathBuf,
    pub hash: String,
}

/// Lazily maps workspace hashes to decoded project paths.
///
/// Each project folder is decoded at most once; decoding stops as soon as the requested hash
/// is found. An index lives for one discovery pass.
#[derive(Debug)]
pub struct WorkspaceIndex<'a, P = FsProbe> {
    codec: &'a PathCodec<P>,
    pending: VecDeque<String>,
    known: HashMap<String, PathBuf>,
}

impl<'a, P: DirectoryProbe> WorkspaceIndex<'a, P> {
    pub fn new(codec: &'a PathCodec<P>, folder_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            codec,
            pending: folder_names.into_iter().collect(),
            known: HashMap::new(),
        }
    }

    /// Lists project folder names under `projects_root`. A missing root yields an empty index.
    pub fn load(codec: &'a PathCodec<P>, projects_root: &Path) -> Self {
        Self::new(codec, list_child_dir_names(projects_root))
    }

    pub fn resolve(&mut self, hash: &str) -> Option<PathBuf> {
        if let Some(path) = self.known.get(hash) {
            return Some(path.clone());
        }
        while let Some(folder) = self.pending.pop_front() {
            let Some(path) = self.codec.decode(&folder) else {
                debug!(folder = %folder, "project folder does not decode to an existing path");
                continue;
            };
            let decoded_hash = workspace_hash(&path);
            self.known.insert(decoded_hash.clone(), path.clone());
            if decoded_hash == hash {
                return Some(path);
            }
        }
        None
    }

    pub fn resolved_count(&self) -> usize {
        self.known.len()
    }
}

/// Walks the chats root for conversation stores.
#[derive(Debug, Clone)]
pub struct ChatDiscovery<P = FsProbe> {
    chats_root: PathBuf,
    projects_root: PathBuf,
    codec: PathCodec<P>,
}

impl ChatDiscovery<FsProbe> {
    pub fn new(chats_root: impl Into<PathBuf>, projects_root: impl Into<PathBuf>) -> Self {
        Self::with_codec(chats_root, projects_root, PathCodec::new())
    }
}

impl<P: DirectoryProbe> ChatDiscovery<P> {
    pub fn with_codec(
        chats_root: impl Into<PathBuf>,
        projects_root: impl Into<PathBuf>,
        codec: PathCodec<P>,
    ) -> Self {
        Self {
            chats_root: chats_root.into(),
            projects_root: projects_root.into(),
            codec,
        }
    }

    pub fn chats_root(&self) -> &Path {
        &self.chats_root
    }

    pub fn workspace_index(&self) -> WorkspaceIndex<'_, P> {
        WorkspaceIndex::load(&self.codec, &self.projects_root)
    }

    /// Returns every conversation with a store file. Order is not significant.
    pub fn discover(&self) -> Result<Vec<ChatLocation>> {
        if !self.chats_root.is_dir() {
            debug!(root = %self.chats_root.display(), "chats root missing");
            return Ok(Vec::new());
        }
        let mut index = self.workspace_index();
        let mut chats = Vec::new();
        let hash_dirs = fs::read_dir(&self.chats_root).with_context(|| {
            format!("failed to read chats root {}", self.chats_root.display())
        })?;

        for entry in hash_dirs {
            let hash_dir = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!(
                        root = %self.chats_root.display(),
                        %error,
                        "skipping unreadable chats entry"
                    );
                    continue;
                }
            };
            if !hash_dir.is_dir() {
                continue;
            }
            let Some(hash) = file_name_string(&hash_dir) else {
                continue;
            };

            let mut resolved: Option<Option<PathBuf>> = None;
            for conversation_id in list_child_dir_names(&hash_dir) {
                let store_path = hash_dir.join(&conversation_id).join(STORE_FILE_NAME);
                if !store_path.is_file() {
                    continue;
                }
                let workspace = resolved
                    .get_or_insert_with(|| index.resolve(&hash))
                    .clone();
                chats.push(ChatLocation {
                    conversation_id,
                    workspace,
                    store_path,
                    hash: hash.clone(),
                });
            }
        }

        debug!(
            chats = chats.len(),
            workspaces = index.resolved_count(),
            "chat discovery complete"
        );
        Ok(chats)
    }

    /// Direct lookup of a single conversation's store.
    pub fn find_store(&self, conversation_id: &str) -> Option<PathBuf> {
        if !is_plain_segment(conversation_id) {
            return None;
        }
        let hash_dirs = fs::read_dir(&self.chats_root).ok()?;
        hash_dirs
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|hash_dir| hash_dir.is_dir())
            .map(|hash_dir| hash_dir.join(conversation_id).join(STORE_FILE_NAME))
            .find(|store_path| store_path.is_file())
    }
}

fn list_child_dir_names(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            debug!(dir = %dir.display(), %error, "directory not readable");
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(error) => {
                warn!(dir = %dir.display(), %error, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|path| path.is_dir())
        .filter_map(|path| file_name_string(&path))
        .collect()
}

fn file_name_string(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

fn is_plain_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains('/')
        && !value.contains(std::path::MAIN_SEPARATOR)
}
