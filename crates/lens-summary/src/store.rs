//! Summary persistence: store contract, SQLite backend and in-memory backend.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Result type for summary store operations.
pub type StoreResult<T> = Result<T, SummaryStoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum SummaryStoreError {
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Persisted summary of one conversation.
pub struct SummaryRecord {
    pub conversation_id: String,
    pub summary_text: String,
    /// Every blob id whose content contributed to `summary_text`.
    pub covered_blob_ids: BTreeSet<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub chat_name: Option<String>,
    pub chat_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fields written by an upsert. Timestamps are assigned by the store.
pub struct SummaryUpsert {
    pub conversation_id: String,
    pub summary_text: String,
    pub covered_blob_ids: BTreeSet<String>,
    pub chat_name: Option<String>,
    pub chat_directory: Option<String>,
}

/// Store contract used by the updater, backfill and search.
pub trait SummaryStore {
    fn get(&self, conversation_id: &str) -> StoreResult<Option<SummaryRecord>>;

    /// Inserts or replaces a record. `created_at_ms` of an existing record is preserved;
    /// `updated_at_ms` becomes `now_ms`.
    fn upsert(&self, upsert: SummaryUpsert, now_ms: u64) -> StoreResult<SummaryRecord>;

    /// Records updated at or after `updated_since_ms`, newest first. Rows that cannot be
    /// decoded are left out.
    fn list_recent(&self, updated_since_ms: u64) -> StoreResult<Vec<SummaryRecord>>;

    fn contains(&self, conversation_id: &str) -> StoreResult<bool> {
        Ok(self.get(conversation_id)?.is_some())
    }
}

impl<T: SummaryStore + ?Sized> SummaryStore for &T {
    fn get(&self, conversation_id: &str) -> StoreResult<Option<SummaryRecord>> {
        (**self).get(conversation_id)
    }

    fn upsert(&self, upsert: SummaryUpsert, now_ms: u64) -> StoreResult<SummaryRecord> {
        (**self).upsert(upsert, now_ms)
    }

    fn list_recent(&self, updated_since_ms: u64) -> StoreResult<Vec<SummaryRecord>> {
        (**self).list_recent(updated_since_ms)
    }

    fn contains(&self, conversation_id: &str) -> StoreResult<bool> {
        (**self).contains(conversation_id)
    }
}

/// In-memory implementation for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    records: Mutex<BTreeMap<String, SummaryRecord>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SummaryStore for InMemorySummaryStore {
    fn get(&self, conversation_id: &str) -> StoreResult<Option<SummaryRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(conversation_id).cloned())
    }

    fn upsert(&self, upsert: SummaryUpsert, now_ms: u64) -> StoreResult<SummaryRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let created_at_ms = records
            .get(&upsert.conversation_id)
            .map(|existing| existing.created_at_ms)
            .unwrap_or(now_ms);
        let record = SummaryRecord {
            conversation_id: upsert.conversation_id,
            summary_text: upsert.summary_text,
            covered_blob_ids: upsert.covered_blob_ids,
            created_at_ms,
            updated_at_ms: now_ms,
            chat_name: upsert.chat_name,
            chat_directory: upsert.chat_directory,
        };
        records.insert(record.conversation_id.clone(), record.clone());
        Ok(record)
    }

    fn list_recent(&self, updated_since_ms: u64) -> StoreResult<Vec<SummaryRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut recent = records
            .values()
            .filter(|record| record.updated_at_ms >= updated_since_ms)
            .cloned()
            .collect::<Vec<_>>();
        recent.sort_by(|left, right| right.updated_at_ms.cmp(&left.updated_at_ms));
        Ok(recent)
    }
}

/// Persistent SQLite backend.
#[derive(Debug, Clone)]
pub struct SqliteSummaryStore {
    db_path: PathBuf,
}

impl SqliteSummaryStore {
    /// Opens the database at `path`, creating parent directories and schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { db_path };
        let connection = store.open_connection()?;
        initialize_schema(&connection)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }
}

fn initialize_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            conversation_id TEXT PRIMARY KEY,
            summary_text TEXT NOT NULL,
            blob_ids_json TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            chat_name TEXT,
            chat_directory TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_updated ON summaries (updated_at);
        CREATE INDEX IF NOT EXISTS idx_summaries_directory ON summaries (chat_directory);
        "#,
    )?;
    Ok(())
}

const SELECT_COLUMNS: &str = "conversation_id, summary_text, blob_ids_json, created_at, \
                              updated_at, chat_name, chat_directory";

impl SummaryStore for SqliteSummaryStore {
    fn get(&self, conversation_id: &str) -> StoreResult<Option<SummaryRecord>> {
        let connection = self.open_connection()?;
        let raw = connection
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM summaries WHERE conversation_id = ?1"),
                params![conversation_id],
                RawSummaryRow::from_row,
            )
            .optional()?;
        raw.map(RawSummaryRow::into_record).transpose()
    }

    fn upsert(&self, upsert: SummaryUpsert, now_ms: u64) -> StoreResult<SummaryRecord> {
        let connection = self.open_connection()?;
        let blob_ids_json = serde_json::to_string(&upsert.covered_blob_ids)?;
        let now = to_sql_millis(now_ms)?;
        connection.execute(
            r#"
            INSERT INTO summaries (
                conversation_id, summary_text, blob_ids_json, created_at, updated_at,
                chat_name, chat_directory
            ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
            ON CONFLICT(conversation_id) DO UPDATE SET
                summary_text = excluded.summary_text,
                blob_ids_json = excluded.blob_ids_json,
                updated_at = excluded.updated_at,
                chat_name = excluded.chat_name,
                chat_directory = excluded.chat_directory
            "#,
            params![
                upsert.conversation_id,
                upsert.summary_text,
                blob_ids_json,
                now,
                upsert.chat_name,
                upsert.chat_directory,
            ],
        )?;
        drop(connection);
        self.get(&upsert.conversation_id)?
            .ok_or_else(|| SummaryStoreError::InvalidPersistedValue {
                field: "conversation_id",
                value: upsert.conversation_id.clone(),
            })
    }

    fn list_recent(&self, updated_since_ms: u64) -> StoreResult<Vec<SummaryRecord>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM summaries WHERE updated_at >= ?1 \
             ORDER BY updated_at DESC"
        ))?;
        let mut rows = statement.query(params![to_sql_millis(updated_since_ms)?])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let raw = RawSummaryRow::from_row(row)?;
            let conversation_id = raw.conversation_id.clone();
            match raw.into_record() {
                Ok(record) => records.push(record),
                Err(error) => warn!(%conversation_id, %error, "skipping unreadable summary row"),
            }
        }
        Ok(records)
    }

    // Existence only; a row with damaged coverage still counts as summarized.
    fn contains(&self, conversation_id: &str) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM summaries WHERE conversation_id = ?1",
                params![conversation_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

struct RawSummaryRow {
    conversation_id: String,
    summary_text: String,
    blob_ids_json: Option<String>,
    created_at: i64,
    updated_at: i64,
    chat_name: Option<String>,
    chat_directory: Option<String>,
}

impl RawSummaryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            conversation_id: row.get(0)?,
            summary_text: row.get(1)?,
            blob_ids_json: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            chat_name: row.get(5)?,
            chat_directory: row.get(6)?,
        })
    }

    fn into_record(self) -> StoreResult<SummaryRecord> {
        let covered_blob_ids = match self.blob_ids_json.as_deref() {
            None | Some("") => BTreeSet::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)?
                .into_iter()
                .collect(),
        };
        Ok(SummaryRecord {
            conversation_id: self.conversation_id,
            summary_text: self.summary_text,
            covered_blob_ids,
            created_at_ms: from_sql_millis("created_at", self.created_at)?,
            updated_at_ms: from_sql_millis("updated_at", self.updated_at)?,
            chat_name: self.chat_name,
            chat_directory: self.chat_directory,
        })
    }
}

fn to_sql_millis(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| SummaryStoreError::InvalidPersistedValue {
        field: "timestamp",
        value: value.to_string(),
    })
}

fn from_sql_millis(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| SummaryStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn upsert(id: &str, text: &str, ids: &[&str]) -> SummaryUpsert {
        SummaryUpsert {
            conversation_id: id.to_string(),
            summary_text: text.to_string(),
            covered_blob_ids: ids.iter().map(|id| id.to_string()).collect(),
            chat_name: Some("Fix login".to_string()),
            chat_directory: Some("/Users/jane/dev/app".to_string()),
        }
    }

    fn exercise_store(store: &dyn SummaryStore) {
        assert_eq!(store.get("c1").expect("get"), None);
        assert!(!store.contains("c1").expect("contains"));

        let created = store
            .upsert(upsert("c1", "first", &["a", "b"]), 1_000)
            .expect("insert");
        assert_eq!(created.created_at_ms, 1_000);
        assert_eq!(created.updated_at_ms, 1_000);

        let updated = store
            .upsert(upsert("c1", "second", &["a", "b", "c"]), 5_000)
            .expect("update");
        assert_eq!(updated.created_at_ms, 1_000);
        assert_eq!(updated.updated_at_ms, 5_000);
        assert_eq!(updated.summary_text, "second");
        assert_eq!(updated.covered_blob_ids.len(), 3);
        assert_eq!(store.get("c1").expect("get"), Some(updated));

        store
            .upsert(upsert("c2", "older", &["x"]), 2_000)
            .expect("insert c2");
        store
            .upsert(upsert("c3", "newest", &["y"]), 9_000)
            .expect("insert c3");

        let recent = store.list_recent(2_000).expect("list");
        let ids = recent
            .iter()
            .map(|record| record.conversation_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c3", "c1", "c2"]);
        assert_eq!(store.list_recent(6_000).expect("list").len(), 1);
    }

    #[test]
    fn functional_in_memory_store_preserves_created_at_and_orders_recent() {
        exercise_store(&InMemorySummaryStore::new());
    }

    #[test]
    fn functional_sqlite_store_preserves_created_at_and_orders_recent() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteSummaryStore::new(temp.path().join("nested/summary.db")).expect("store");
        exercise_store(&store);
    }

    #[test]
    fn integration_sqlite_store_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.db");
        {
            let store = SqliteSummaryStore::new(&path).expect("store");
            store
                .upsert(upsert("c1", "kept", &["b", "a"]), 42)
                .expect("insert");
        }
        let reopened = SqliteSummaryStore::new(&path).expect("reopen");
        let record = reopened.get("c1").expect("get").expect("record");
        assert_eq!(record.summary_text, "kept");
        assert_eq!(
            record.covered_blob_ids.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn regression_sqlite_store_reads_null_blob_ids_as_empty_coverage() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.db");
        let store = SqliteSummaryStore::new(&path).expect("store");
        Connection::open(&path)
            .expect("open")
            .execute(
                "INSERT INTO summaries (conversation_id, summary_text, blob_ids_json, created_at, updated_at) \
                 VALUES ('legacy', 'text', NULL, 1, 1)",
                [],
            )
            .expect("insert legacy row");
        let record = store.get("legacy").expect("get").expect("record");
        assert!(record.covered_blob_ids.is_empty());
        assert_eq!(record.chat_name, None);
    }

    #[test]
    fn regression_sqlite_store_rejects_corrupt_blob_ids() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.db");
        let store = SqliteSummaryStore::new(&path).expect("store");
        Connection::open(&path)
            .expect("open")
            .execute(
                "INSERT INTO summaries (conversation_id, summary_text, blob_ids_json, created_at, updated_at) \
                 VALUES ('bad', 'text', '{oops', 1, 1)",
                [],
            )
            .expect("insert corrupt row");
        assert!(matches!(store.get("bad"), Err(SummaryStoreError::Json(_))));
    }

    #[test]
    fn regression_sqlite_store_corrupt_row_does_not_hide_healthy_rows() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.db");
        let store = SqliteSummaryStore::new(&path).expect("store");
        store
            .upsert(upsert("good", "healthy", &["a"]), 10)
            .expect("insert good");
        Connection::open(&path)
            .expect("open")
            .execute(
                "INSERT INTO summaries (conversation_id, summary_text, blob_ids_json, created_at, updated_at) \
                 VALUES ('bad', 'text', '{\"not\":\"a list\"}', 20, 20)",
                [],
            )
            .expect("insert corrupt row");

        assert!(store.contains("bad").expect("contains bad"));
        assert!(store.contains("good").expect("contains good"));
        assert!(!store.contains("absent").expect("contains absent"));
        assert!(store.get("bad").is_err());

        let recent = store.list_recent(0).expect("list");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].conversation_id, "good");
    }
}
