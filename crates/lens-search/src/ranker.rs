use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use lens_ai::{CompletionClient, CompletionRequest, DEFAULT_COMPLETION_TIMEOUT_MS};
use lens_summary::SummaryRecord;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Default number of results shown by search.
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Reason attached to keyword-ranked results.
pub const KEYWORD_MATCH_REASON: &str = "Keyword match";

const UNNAMED_CHAT: &str = "Unnamed";
const UNKNOWN_DIRECTORY: &str = "Unknown";

fn json_array_regex() -> Option<&'static Regex> {
    static JSON_ARRAY: OnceLock<Option<Regex>> = OnceLock::new();
    JSON_ARRAY
        .get_or_init(|| Regex::new(r"(?s)\[.*\]").ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedSummary {
    pub record: SummaryRecord,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingMode {
    #[default]
    Keyword,
    /// Ask the completion backend; falls back to keywords on any failure.
    Smart,
}

/// Scores each summary by how many distinct query keywords occur in its summary, name and
/// directory. Ties keep input order.
pub fn rank_by_keywords(
    query: &str,
    summaries: &[SummaryRecord],
    max_results: usize,
) -> Vec<RankedSummary> {
    let lowered = query.to_lowercase();
    let keywords = lowered.split_whitespace().collect::<BTreeSet<_>>();
    if keywords.is_empty() || max_results == 0 {
        return Vec::new();
    }

    let mut scored = summaries
        .iter()
        .filter_map(|record| {
            let haystack = format!(
                "{} {} {}",
                record.summary_text,
                record.chat_name.as_deref().unwrap_or_default(),
                record.chat_directory.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            let score = keywords
                .iter()
                .filter(|keyword| haystack.contains(*keyword))
                .count();
            (score > 0).then_some((score, record))
        })
        .collect::<Vec<_>>();
    scored.sort_by(|left, right| right.0.cmp(&left.0));
    scored
        .into_iter()
        .take(max_results)
        .map(|(_, record)| RankedSummary {
            record: record.clone(),
            reason: KEYWORD_MATCH_REASON.to_string(),
        })
        .collect()
}

#[derive(Serialize)]
struct RankingCandidate<'a> {
    id: &'a str,
    summary: &'a str,
    name: &'a str,
    directory: &'a str,
}

pub fn build_ranking_prompt(query: &str, summaries: &[SummaryRecord], max_results: usize) -> String {
    let candidates = summaries
        .iter()
        .map(|record| RankingCandidate {
            id: &record.conversation_id,
            summary: &record.summary_text,
            name: record.chat_name.as_deref().unwrap_or(UNNAMED_CHAT),
            directory: record.chat_directory.as_deref().unwrap_or(UNKNOWN_DIRECTORY),
        })
        .collect::<Vec<_>>();
    let candidates_json =
        serde_json::to_string_pretty(&candidates).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Rank these chats by relevance to: \"{query}\"

{candidates_json}

Return JSON array with relevant chats only (max {max_results}):
[{{\"id\": \"...\", \"reason\": \"...\"}}]

If none match, return: []"
    )
}

/// Extracts `[{"id", "reason"}]` from a free-form reply. Unknown and repeated ids are dropped;
/// anything unparsable yields an empty list.
pub fn parse_ranking_response(response: &str, summaries: &[SummaryRecord]) -> Vec<RankedSummary> {
    let Some(span) = json_array_regex().and_then(|pattern| pattern.find(response)) else {
        return Vec::new();
    };
    let items = match serde_json::from_str::<Vec<Value>>(span.as_str()) {
        Ok(items) => items,
        Err(error) => {
            debug!(%error, "ranking reply is not a JSON array");
            return Vec::new();
        }
    };

    let by_id = summaries
        .iter()
        .map(|record| (record.conversation_id.as_str(), record))
        .collect::<HashMap<_, _>>();
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let record = by_id.get(id)?;
            if !seen.insert(id) {
                return None;
            }
            let reason = item
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(RankedSummary {
                record: (*record).clone(),
                reason,
            })
        })
        .collect()
}

/// Ranks summaries by keywords, or through the completion backend on request.
#[derive(Debug, Clone)]
pub struct Ranker<C> {
    client: C,
    model: String,
    timeout_ms: u64,
}

impl<C: CompletionClient> Ranker<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn rank(
        &self,
        query: &str,
        summaries: &[SummaryRecord],
        max_results: usize,
        mode: RankingMode,
    ) -> Vec<RankedSummary> {
        if summaries.is_empty() {
            return Vec::new();
        }
        if mode == RankingMode::Smart {
            let mut ranked = self.rank_with_completion(query, summaries, max_results);
            if !ranked.is_empty() {
                ranked.truncate(max_results);
                return ranked;
            }
            debug!("falling back to keyword ranking");
        }
        rank_by_keywords(query, summaries, max_results)
    }

    fn rank_with_completion(
        &self,
        query: &str,
        summaries: &[SummaryRecord],
        max_results: usize,
    ) -> Vec<RankedSummary> {
        let prompt = build_ranking_prompt(query, summaries, max_results);
        let request =
            CompletionRequest::new(prompt, self.model.as_str()).with_timeout_ms(self.timeout_ms);
        match self.client.complete(&request) {
            Ok(reply) => parse_ranking_response(&reply, summaries),
            Err(error) => {
                warn!(model = %self.model, %error, "ranking completion failed");
                Vec::new()
            }
        }
    }
}
