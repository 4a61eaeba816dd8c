use serde::{Deserialize, Serialize};

use crate::members::Member;

pub mod semantic;
pub mod service;
pub mod text;

pub use service::{SearchError, SearchService};

/// Upper bound on results per request, whatever the caller asks for.
pub const MAX_RESULT_LIMIT: i64 = 50;
pub const DEFAULT_RESULT_LIMIT: i64 = 10;

/// Queries shorter than this (after trimming) are rejected.
pub const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub member: Member,
    pub similarity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub search_type: SearchType,
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_RESULT_LIMIT)
}
