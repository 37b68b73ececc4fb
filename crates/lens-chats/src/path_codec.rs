//! Workspace folder-name decoding.
//!
//! The agent names each project folder by joining every segment of the workspace's absolute
//! path with `-`, so `/Users/jane/dev/my-app` becomes `Users-jane-dev-my-app`. The encoding
//! is lossy: a `-` may be a path boundary or part of a segment name. Decoding is therefore a
//! search over segmentations, with the live filesystem as the oracle. Only directories that
//! exist are ever returned.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

/// The ambiguous separator used by project folder names.
pub const WORKSPACE_SEPARATOR: char = '-';
const SEPARATOR_STR: &str = "-";

/// Existence oracle consulted by [`PathCodec`].
pub trait DirectoryProbe {
    fn is_dir(&self, path: &Path) -> bool;
}

/// Probes the real filesystem with read-only metadata calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsProbe;

impl DirectoryProbe for FsProbe {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

impl DirectoryProbe for BTreeSet<PathBuf> {
    fn is_dir(&self, path: &Path) -> bool {
        self.contains(path)
    }
}

impl DirectoryProbe for HashSet<PathBuf> {
    fn is_dir(&self, path: &Path) -> bool {
        self.contains(path)
    }
}

impl<P: DirectoryProbe + ?Sized> DirectoryProbe for &P {
    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }
}

/// Decodes project folder names into existing workspace directories below `root`.
#[derive(Debug, Clone)]
pub struct PathCodec<P = FsProbe> {
    root: PathBuf,
    probe: P,
}

impl PathCodec<FsProbe> {
    /// Codec anchored at the filesystem root.
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/"))
    }

    /// Codec anchored at `root`; decoded paths are `root` joined with the segments.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::with_probe(root, FsProbe)
    }
}

impl Default for PathCodec<FsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: DirectoryProbe> PathCodec<P> {
    pub fn with_probe(root: impl Into<PathBuf>, probe: P) -> Self {
        Self {
            root: root.into(),
            probe,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the existing directory encoded by `folder_name`, or `None` when no
    /// segmentation of the name names a directory that exists right now.
    pub fn decode(&self, folder_name: &str) -> Option<PathBuf> {
        // Some agents mark the absolute root with a leading separator.
        let name = folder_name
            .strip_prefix(WORKSPACE_SEPARATOR)
            .unwrap_or(folder_name);
        if name.is_empty() {
            return None;
        }
        let tokens = name.split(WORKSPACE_SEPARATOR).collect::<Vec<_>>();

        if tokens.iter().all(|token| is_valid_segment(token)) {
            let direct = tokens
                .iter()
                .fold(self.root.clone(), |path, token| path.join(token));
            if self.probe.is_dir(&direct) {
                return Some(direct);
            }
        }

        self.resolve_segments(&self.root, &tokens)
    }

    /// Consumes 1, 2, 3, ... leading tokens as one segment, shortest first, and backtracks
    /// whenever a branch cannot reach an existing directory with all tokens consumed.
    fn resolve_segments(&self, prefix: &Path, tokens: &[&str]) -> Option<PathBuf> {
        for take in 1..=tokens.len() {
            let segment = tokens[..take].join(SEPARATOR_STR);
            if !is_valid_segment(&segment) {
                continue;
            }
            let candidate = prefix.join(&segment);
            if !self.probe.is_dir(&candidate) {
                continue;
            }
            if take == tokens.len() {
                return Some(candidate);
            }
            if let Some(found) = self.resolve_segments(&candidate, &tokens[take..]) {
                return Some(found);
            }
        }
        None
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains(std::path::MAIN_SEPARATOR)
}

/// Encodes an absolute path the way the agent names project folders.
pub fn encode_workspace_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR_STR)
}
