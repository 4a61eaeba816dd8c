use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::{SearchResult, SearchType};

/// Body of `POST /semantic-search`. Both fields are optional on the wire so
/// that a missing query is reported as a validation error, not a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub count: usize,
    pub search_type: SearchType,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingRefreshResponse {
    pub success: bool,
    pub member_id: Uuid,
    // None when the member had no profile text and the embedding was cleared
    pub dimensions: Option<usize>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePictureResponse {
    pub success: bool,
    pub member_id: Uuid,
    pub profile_picture_url: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: String,
}

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
