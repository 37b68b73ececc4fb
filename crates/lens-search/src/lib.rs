//! Ranking of stored chat summaries against a free-text description.
mod ranker;

pub use ranker::{
    build_ranking_prompt, parse_ranking_response, rank_by_keywords, RankedSummary, Ranker,
    RankingMode, DEFAULT_MAX_RESULTS, KEYWORD_MATCH_REASON,
};
