use std::sync::Arc;

use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{error, instrument, warn};

use crate::embedding::Embedder;
use crate::members::{MemberStore, StoreError};
use crate::metrics_consts::{
    SEARCH_FAILURES, SEARCH_FALLBACKS, SEARCH_REQUESTS, SEARCH_RESULT_COUNT, SEARCH_TIME,
};
use crate::search::semantic::{semantic_search, SemanticError};
use crate::search::text::text_search;
use crate::search::{clamp_limit, SearchOutcome, SearchResult, SearchType};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("semantic search failed ({semantic}) and text search failed ({text})")]
    Failed {
        semantic: SemanticError,
        text: StoreError,
    },
}

/// Semantic search first, text search when anything on the semantic path
/// fails. No retries.
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MemberStore>,
    similarity_threshold: f64,
}

impl SearchService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn MemberStore>,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            embedder,
            store,
            similarity_threshold,
        }
    }

    #[instrument(skip_all, fields(limit = limit))]
    pub async fn search(&self, query: &str, limit: i64) -> Result<SearchOutcome, SearchError> {
        let limit = clamp_limit(limit);
        counter!(SEARCH_REQUESTS).increment(1);
        let timer = common_metrics::timing_guard(SEARCH_TIME, &[]);

        let semantic_error = match semantic_search(
            self.embedder.as_ref(),
            self.store.as_ref(),
            query,
            limit,
            self.similarity_threshold,
        )
        .await
        {
            Ok(results) => {
                timer.label("search_type", "semantic").fin();
                return Ok(self.finish(results, SearchType::Semantic));
            }
            Err(e) => e,
        };

        warn!(
            "semantic search failed, falling back to text search: {}",
            semantic_error
        );
        counter!(SEARCH_FALLBACKS).increment(1);

        match text_search(self.store.as_ref(), query, limit).await {
            Ok(results) => {
                timer.label("search_type", "text").fin();
                Ok(self.finish(results, SearchType::Text))
            }
            Err(text_error) => {
                timer.label("search_type", "failed").fin();
                counter!(SEARCH_FAILURES).increment(1);
                error!("text search failed after semantic failure: {}", text_error);
                Err(SearchError::Failed {
                    semantic: semantic_error,
                    text: text_error,
                })
            }
        }
    }

    fn finish(&self, results: Vec<SearchResult>, search_type: SearchType) -> SearchOutcome {
        let label = match search_type {
            SearchType::Semantic => "semantic",
            SearchType::Text => "text",
        };
        histogram!(SEARCH_RESULT_COUNT, "search_type" => label).record(results.len() as f64);
        SearchOutcome {
            results,
            search_type,
        }
    }
}
