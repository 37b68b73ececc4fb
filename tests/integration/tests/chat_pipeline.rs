use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use lens_ai::{CompletionClient, CompletionError, CompletionRequest};
use lens_chats::{workspace_hash, ChatDiscovery, ChatLocation, PathCodec};
use lens_search::{Ranker, RankingMode, KEYWORD_MATCH_REASON};
use lens_summary::{
    IncrementalUpdater, SqliteSummaryStore, SummaryEngine, SummaryStore, UpdateOutcome,
};
use rusqlite::{params, Connection};
use serde_json::json;
use tempfile::{tempdir, TempDir};

const GOOD_SUMMARY: &str = "Fixed a login bug in auth.py by correcting a password hashing mismatch.";
const FOLLOW_UP_SUMMARY: &str =
    "Fixed a login bug in auth.py and added rate limiting to the login endpoint against brute force.";

struct ScriptedClient {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedClient {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|reply| reply.to_string()).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn prompt_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or(CompletionError::EmptyOutput)
    }
}

struct CursorHome {
    temp: TempDir,
}

impl CursorHome {
    fn new() -> Self {
        Self {
            temp: tempdir().expect("tempdir"),
        }
    }

    fn fs_root(&self) -> PathBuf {
        self.temp.path().join("fs")
    }

    fn chats_root(&self) -> PathBuf {
        self.temp.path().join("chats")
    }

    fn projects_root(&self) -> PathBuf {
        self.temp.path().join("projects")
    }

    fn summary_db(&self) -> PathBuf {
        self.temp.path().join("summary.db")
    }

    fn discovery(&self) -> ChatDiscovery {
        ChatDiscovery::with_codec(
            self.chats_root(),
            self.projects_root(),
            PathCodec::with_root(self.fs_root()),
        )
    }

    /// Creates `<fs>/Users/jane/dev/my-app` and its project folder; returns the workspace path.
    fn add_workspace(&self) -> PathBuf {
        let workspace = self.fs_root().join("Users/jane/dev/my-app");
        fs::create_dir_all(&workspace).expect("workspace");
        fs::create_dir_all(self.projects_root().join("Users-jane-dev-my-app"))
            .expect("project folder");
        workspace
    }

    fn store_path(&self, workspace: &Path, conversation_id: &str) -> PathBuf {
        self.chats_root()
            .join(workspace_hash(workspace))
            .join(conversation_id)
            .join("store.db")
    }
}

fn create_chat_store(path: &Path, name: &str) -> Connection {
    fs::create_dir_all(path.parent().expect("parent")).expect("chat dir");
    let connection = Connection::open(path).expect("open store");
    connection
        .execute_batch(
            "CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE blobs (id TEXT PRIMARY KEY, data BLOB);",
        )
        .expect("schema");
    let meta = json!({"name": name, "createdAt": 1_700_000_000_000u64}).to_string();
    let meta_hex = meta
        .bytes()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    connection
        .execute(
            "INSERT INTO meta (key, value) VALUES ('0', ?1)",
            params![meta_hex],
        )
        .expect("meta");
    connection
}

fn insert_blob(connection: &Connection, id: &str, payload: serde_json::Value) {
    connection
        .execute(
            "INSERT INTO blobs (id, data) VALUES (?1, ?2)",
            params![id, payload.to_string().into_bytes()],
        )
        .expect("blob");
}

fn seed_login_chat(connection: &Connection) {
    insert_blob(
        connection,
        "blob-a",
        json!({"role": "user", "content": "<user_query>Fix the login bug in auth.py</user_query>"}),
    );
    insert_blob(
        connection,
        "blob-b",
        json!({
            "role": "assistant",
            "content": [
                {"type": "reasoning", "text": "thinking about salts"},
                {"type": "text", "text": "The stored hashes use a per-user salt but the login path hashed with the global salt. I switched verification to the stored salt."}
            ]
        }),
    );
    insert_blob(
        connection,
        "blob-system",
        json!({"role": "system", "content": "You are gpt-5 running as a coding agent."}),
    );
}

fn discover_single(home: &CursorHome) -> ChatLocation {
    let mut chats = home.discovery().discover().expect("discover");
    assert_eq!(chats.len(), 1);
    chats.remove(0)
}

#[test]
fn integration_first_summary_is_stored_verbatim_with_full_coverage() {
    let home = CursorHome::new();
    let workspace = home.add_workspace();
    let connection = create_chat_store(&home.store_path(&workspace, "conv-login"), "Login fix");
    seed_login_chat(&connection);
    drop(connection);

    let chat = discover_single(&home);
    assert_eq!(chat.workspace.as_deref(), Some(workspace.as_path()));

    let client = ScriptedClient::new(&[GOOD_SUMMARY]);
    let updater = IncrementalUpdater::new(SummaryEngine::new(&client, "grok"));
    let summaries = SqliteSummaryStore::new(home.summary_db()).expect("summary db");
    let outcome = updater
        .run_store(
            &chat.conversation_id,
            &chat.store_path,
            chat.workspace.as_deref(),
            &summaries,
        )
        .expect("update");
    assert_eq!(outcome, UpdateOutcome::Created);

    let record = summaries
        .get("conv-login")
        .expect("get")
        .expect("record");
    assert_eq!(record.summary_text, GOOD_SUMMARY);
    assert!(record.covered_blob_ids.contains("blob-a"));
    assert!(record.covered_blob_ids.contains("blob-b"));
    assert_eq!(record.chat_name.as_deref(), Some("Login fix"));
    assert_eq!(
        record.chat_directory.as_deref(),
        Some(workspace.to_string_lossy().as_ref())
    );

    let prompts = client.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Fix the login bug in auth.py"));
    assert!(!prompts[0].contains("<user_query>"));
    assert!(!prompts[0].contains("thinking about salts"));
    assert!(!prompts[0].contains("You are gpt-5"));
}

#[test]
fn integration_incremental_update_sends_only_new_blobs() {
    let home = CursorHome::new();
    let workspace = home.add_workspace();
    let connection = create_chat_store(&home.store_path(&workspace, "conv-login"), "Login fix");
    seed_login_chat(&connection);

    let client = ScriptedClient::new(&[GOOD_SUMMARY, FOLLOW_UP_SUMMARY]);
    let updater = IncrementalUpdater::new(SummaryEngine::new(&client, "grok"));
    let summaries = SqliteSummaryStore::new(home.summary_db()).expect("summary db");
    let chat = discover_single(&home);
    let run = || {
        updater
            .run_store(
                &chat.conversation_id,
                &chat.store_path,
                chat.workspace.as_deref(),
                &summaries,
            )
            .expect("update")
    };

    assert_eq!(run(), UpdateOutcome::Created);
    let created_at = summaries
        .get("conv-login")
        .expect("get")
        .expect("record")
        .created_at_ms;

    assert_eq!(run(), UpdateOutcome::Unchanged);
    assert_eq!(client.prompt_count(), 1);

    insert_blob(
        &connection,
        "blob-c",
        json!({
            "role": "assistant",
            "content": "Added a sliding window rate limiter to the login endpoint so repeated failed attempts from one address are throttled."
        }),
    );
    assert_eq!(run(), UpdateOutcome::Updated);
    assert_eq!(client.prompt_count(), 2);

    let prompts = client.prompts.borrow();
    let update_prompt = &prompts[1];
    assert!(update_prompt.contains(&format!("EXISTING SUMMARY:\n{GOOD_SUMMARY}")));
    assert!(update_prompt.contains("sliding window rate limiter"));
    assert!(!update_prompt.contains("Fix the login bug in auth.py"));

    let record = summaries
        .get("conv-login")
        .expect("get")
        .expect("record");
    assert_eq!(record.summary_text, FOLLOW_UP_SUMMARY);
    assert_eq!(record.created_at_ms, created_at);
    let expected = ["blob-a", "blob-b", "blob-c", "blob-system"]
        .into_iter()
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    assert_eq!(record.covered_blob_ids, expected);
}

#[test]
fn integration_stored_summaries_are_searchable() {
    let home = CursorHome::new();
    let workspace = home.add_workspace();
    let connection = create_chat_store(&home.store_path(&workspace, "conv-login"), "Login fix");
    seed_login_chat(&connection);
    drop(connection);

    let client = ScriptedClient::new(&[GOOD_SUMMARY]);
    let updater = IncrementalUpdater::new(SummaryEngine::new(&client, "grok"));
    let summaries = SqliteSummaryStore::new(home.summary_db()).expect("summary db");
    let chat = discover_single(&home);
    updater
        .run_store(
            &chat.conversation_id,
            &chat.store_path,
            chat.workspace.as_deref(),
            &summaries,
        )
        .expect("update");

    let recent = summaries.list_recent(0).expect("recent");
    let keyword_ranker = Ranker::new(ScriptedClient::new(&[]), "grok");
    let ranked = keyword_ranker.rank("password HASHING", &recent, 3, RankingMode::Keyword);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].record.conversation_id, "conv-login");
    assert_eq!(ranked[0].reason, KEYWORD_MATCH_REASON);

    let smart_ranker = Ranker::new(
        ScriptedClient::new(&[r#"Best match: [{"id": "conv-login", "reason": "auth.py login fix"}]"#]),
        "grok",
    );
    let ranked = smart_ranker.rank("that auth thing", &recent, 3, RankingMode::Smart);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].reason, "auth.py login fix");

    // A failed completion degrades to keyword ranking.
    let failing_ranker = Ranker::new(ScriptedClient::new(&[]), "grok");
    let ranked = failing_ranker.rank("login", &recent, 3, RankingMode::Smart);
    assert_eq!(ranked[0].reason, KEYWORD_MATCH_REASON);
}
