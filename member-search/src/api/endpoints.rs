use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use bytes::Bytes;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    api::{
        errors::ApiError,
        types::{
            timestamp, EmbeddingRefreshResponse, ProfilePictureResponse, SearchRequest,
            SearchResponse,
        },
    },
    members::profile::refresh_member_embedding,
    search::MIN_QUERY_CHARS,
    state::AppState,
    storage::profile_pictures::upload_profile_picture,
};

/// Validated search parameters: trimmed query and a positive limit.
pub fn parse_search_request(body: &[u8], default_limit: i64) -> Result<(String, i64), ApiError> {
    let request: SearchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SearchRequest::default()
    } else {
        serde_json::from_slice(body)?
    };

    let query = request.query.unwrap_or_default().trim().to_string();
    if query.is_empty() {
        return Err(ApiError::MissingQuery);
    }
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::QueryTooShort);
    }

    let limit = match request.limit {
        None => default_limit,
        Some(limit) if limit < 1 => return Err(ApiError::InvalidLimit),
        Some(limit) => limit,
    };
    Ok((query, limit))
}

#[instrument(skip_all)]
pub async fn semantic_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, ApiError> {
    // Validation happens before any embedding or database call
    let (query, limit) = parse_search_request(&body, state.default_result_limit)?;

    let outcome = state.search.search(&query, limit).await?;
    info!(
        search_type = ?outcome.search_type,
        count = outcome.results.len(),
        "search complete"
    );

    Ok(Json(SearchResponse {
        success: true,
        query,
        count: outcome.results.len(),
        results: outcome.results,
        search_type: outcome.search_type,
        timestamp: timestamp(),
    }))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

fn parse_member_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidMemberId(raw.to_string()))
}

#[instrument(skip(state))]
pub async fn refresh_embedding(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> Result<Json<EmbeddingRefreshResponse>, ApiError> {
    let member_id = parse_member_id(&member_id)?;
    let dimensions =
        refresh_member_embedding(state.embedder.as_ref(), state.store.as_ref(), member_id).await?;

    Ok(Json(EmbeddingRefreshResponse {
        success: true,
        member_id,
        dimensions,
        timestamp: timestamp(),
    }))
}

#[instrument(skip(state, headers, body))]
pub async fn upload_picture(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProfilePictureResponse>, ApiError> {
    let member_id = parse_member_id(&member_id)?;
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let url = upload_profile_picture(
        state.objects.as_ref(),
        state.store.as_ref(),
        member_id,
        content_type,
        body,
    )
    .await?;

    Ok(Json(ProfilePictureResponse {
        success: true,
        member_id,
        profile_picture_url: url,
        timestamp: timestamp(),
    }))
}
