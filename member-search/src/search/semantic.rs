use thiserror::Error;
use tracing::debug;

use crate::embedding::{Embedder, EmbeddingError};
use crate::members::{MemberMatch, MemberStore, StoreError};
use crate::search::SearchResult;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("could not embed query: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("similarity query failed: {0}")]
    Store(#[from] StoreError),
}

/// Cosine similarity of two equally sized vectors; 0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Turns ranked `match_members` rows into results with scores in [0,1],
/// in non-increasing score order. Ties keep the order the rows arrived in.
pub fn rank_matches(matches: Vec<MemberMatch>) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = matches
        .into_iter()
        .map(|m| SearchResult {
            member: m.member,
            similarity_score: clamp_score(m.match_score),
            highlight: None,
        })
        .collect();
    results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    results
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub async fn semantic_search(
    embedder: &dyn Embedder,
    store: &dyn MemberStore,
    query: &str,
    limit: i64,
    similarity_threshold: f64,
) -> Result<Vec<SearchResult>, SemanticError> {
    let embedding = embedder.embed(query).await?;
    let matches = store
        .match_members(&embedding, limit, similarity_threshold)
        .await?;
    debug!(matches = matches.len(), "similarity query returned");

    let mut results = rank_matches(matches);
    results.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(results)
}
