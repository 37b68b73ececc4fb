//! Read-only access to one conversation's `store.db`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::BlobRecord;

/// File name of a conversation store inside its conversation directory.
pub const STORE_FILE_NAME: &str = "store.db";

const META_KEY: &str = "0";
const UNNAMED_CHAT: &str = "Unnamed";

#[derive(Debug, Error)]
/// Enumerates supported `ChatStoreError` values.
pub enum ChatStoreError {
    #[error("failed to open chat store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Chat-level metadata stored under meta key `0`.
pub struct ChatMeta {
    pub name: Option<String>,
    pub created_at_ms: Option<u64>,
}

impl ChatMeta {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNNAMED_CHAT)
    }

    fn from_value(value: &Value) -> Self {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let created_at_ms = value.get("createdAt").and_then(|created| {
            created.as_u64().or_else(|| {
                created
                    .as_f64()
                    .filter(|millis| millis.is_finite() && *millis >= 0.0)
                    .map(|millis| millis as u64)
            })
        });
        Self {
            name,
            created_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Excludes chats carrying `name` that were created at or after the cutoff.
///
/// The agent creates placeholder chats under a fixed default name; rules let configuration
/// ignore those without hard-coding the name or the cutoff.
pub struct NamedChatSkipRule {
    pub name: String,
    pub created_at_or_after_ms: u64,
}

impl NamedChatSkipRule {
    pub fn matches(&self, meta: &ChatMeta) -> bool {
        meta.name.as_deref() == Some(self.name.as_str())
            && meta
                .created_at_ms
                .is_some_and(|created| created >= self.created_at_or_after_ms)
    }
}

/// An open, read-only conversation store.
#[derive(Debug)]
pub struct ChatStore {
    path: PathBuf,
    connection: Connection,
}

impl ChatStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChatStoreError> {
        let path = path.as_ref().to_path_buf();
        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| ChatStoreError::Open {
            path: path.clone(),
            source,
        })?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { path, connection })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads chat metadata. Missing tables, missing rows and undecodable values all yield
    /// `None`.
    pub fn read_meta(&self) -> Option<ChatMeta> {
        let raw = self
            .connection
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [META_KEY],
                |row| {
                    Ok(match row.get_ref(0)? {
                        ValueRef::Text(text) => decode_meta_text(text),
                        ValueRef::Blob(bytes) => Some(bytes.to_vec()),
                        _ => None,
                    })
                },
            )
            .optional();
        let bytes = match raw {
            Ok(Some(Some(bytes))) => bytes,
            Ok(_) => return None,
            Err(error) => {
                debug!(path = %self.path.display(), %error, "chat meta unavailable");
                return None;
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => Some(ChatMeta::from_value(&value)),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "skipping malformed chat meta");
                None
            }
        }
    }

    /// Lists every blob whose payload starts with `{` and parses as JSON, in storage order.
    pub fn list_json_blobs(&self) -> Result<Vec<BlobRecord>, ChatStoreError> {
        let mut statement = self.connection.prepare(
            r#"
            SELECT id, data FROM blobs
            WHERE hex(substr(data, 1, 1)) = '7B'
            "#,
        )?;
        let mut rows = statement.query([])?;
        let mut blobs = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            let Some(id) = blob_id(row.get_ref(0)?) else {
                skipped += 1;
                continue;
            };
            let parsed = match row.get_ref(1)? {
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    serde_json::from_slice::<Value>(bytes).ok()
                }
                _ => None,
            };
            match parsed {
                Some(payload) => blobs.push(BlobRecord::new(id, payload)),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(path = %self.path.display(), skipped, "skipped unparsable blobs");
        }
        Ok(blobs)
    }
}

fn blob_id(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Integer(id) => Some(id.to_string()),
        ValueRef::Blob(bytes) => Some(encode_hex(bytes)),
        ValueRef::Null | ValueRef::Real(_) => None,
    }
}

/// Meta values are usually hex-encoded JSON; some stores keep the JSON text as is.
fn decode_meta_text(text: &[u8]) -> Option<Vec<u8>> {
    let trimmed = std::str::from_utf8(text).ok()?.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        return Some(trimmed.as_bytes().to_vec());
    }
    decode_hex(trimmed.as_bytes())
}

fn decode_hex(text: &[u8]) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    text.chunks_exact(2)
        .map(|pair| Some((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?))
        .collect()
}

fn hex_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::write_store;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn functional_chat_store_reads_hex_meta_and_json_blobs() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("conv-1").join(STORE_FILE_NAME);
        write_store(
            &path,
            Some(r#"{"name":"Fix login","createdAt":1767205800123}"#),
            &[
                ("a", br#"{"role":"user","content":"hello there friend"}"#),
                ("b", b"\x00\x01binary-tree-node"),
                ("c", br#"{"role":"assistant","content":"hi"}"#),
                ("d", b"{not json"),
            ],
        );

        let store = ChatStore::open(&path).expect("open");
        let meta = store.read_meta().expect("meta");
        assert_eq!(meta.display_name(), "Fix login");
        assert_eq!(meta.created_at_ms, Some(1_767_205_800_123));

        let blobs = store.list_json_blobs().expect("blobs");
        let ids = blobs.iter().map(|blob| blob.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(blobs[1].payload["content"], "hi");
    }

    #[test]
    fn unit_read_meta_accepts_raw_json_text_and_blob_values() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(STORE_FILE_NAME);
        write_store(&path, None, &[]);
        {
            let connection = Connection::open(&path).expect("open writable");
            connection
                .execute(
                    "INSERT INTO meta (key, value) VALUES ('0', ?1)",
                    [r#"{"name":"Raw","createdAt":12.0}"#],
                )
                .expect("insert raw meta");
        }
        let meta = ChatStore::open(&path)
            .expect("open")
            .read_meta()
            .expect("meta");
        assert_eq!(meta.name.as_deref(), Some("Raw"));
        assert_eq!(meta.created_at_ms, Some(12));
    }

    #[test]
    fn regression_read_meta_tolerates_missing_and_garbage_values() {
        let temp = tempdir().expect("tempdir");
        let empty = temp.path().join("empty.db");
        write_store(&empty, None, &[]);
        assert_eq!(ChatStore::open(&empty).expect("open").read_meta(), None);

        let garbage = temp.path().join("garbage.db");
        write_store(&garbage, Some("not json at all"), &[]);
        assert_eq!(ChatStore::open(&garbage).expect("open").read_meta(), None);

        let bare = temp.path().join("bare.db");
        Connection::open(&bare)
            .expect("create bare")
            .execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .expect("schema");
        let store = ChatStore::open(&bare).expect("open");
        assert_eq!(store.read_meta(), None);
        assert!(store.list_json_blobs().is_err());
    }

    #[test]
    fn regression_open_reports_missing_store_without_creating_it() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("missing").join(STORE_FILE_NAME);
        let error = ChatStore::open(&path).expect_err("missing store must fail");
        assert!(matches!(error, ChatStoreError::Open { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn unit_chat_meta_display_name_falls_back_to_unnamed() {
        assert_eq!(ChatMeta::default().display_name(), "Unnamed");
        let blank = ChatMeta {
            name: Some("  ".to_string()),
            created_at_ms: None,
        };
        assert_eq!(blank.display_name(), "Unnamed");
    }

    #[test]
    fn unit_named_chat_skip_rule_requires_name_and_cutoff() {
        let rule = NamedChatSkipRule {
            name: "New Agent".to_string(),
            created_at_or_after_ms: 1_767_205_800_000,
        };
        let meta = |name: &str, created: Option<u64>| ChatMeta {
            name: Some(name.to_string()),
            created_at_ms: created,
        };
        assert!(rule.matches(&meta("New Agent", Some(1_767_205_800_000))));
        assert!(!rule.matches(&meta("New Agent", Some(1_767_205_799_999))));
        assert!(!rule.matches(&meta("New Agent", None)));
        assert!(!rule.matches(&meta("Fix login", Some(1_900_000_000_000))));
    }

    #[test]
    fn unit_hex_helpers_decode_and_reject() {
        assert_eq!(decode_hex(b"7b7D"), Some(b"{}".to_vec()));
        assert_eq!(decode_hex(b"7"), None);
        assert_eq!(decode_hex(b"zz"), None);
        assert_eq!(encode_hex(&[0xde, 0xad]), "dead");
    }
}
