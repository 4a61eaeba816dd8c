use std::future::ready;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method, StatusCode,
    },
    routing::{get, post},
    Router,
};
use common_metrics::{setup_metrics_recorder, track_metrics};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api::endpoints::{method_not_allowed, refresh_embedding, semantic_search, upload_picture},
    state::AppState,
    storage::profile_pictures::MAX_PROFILE_PICTURE_BYTES,
};

// Oversized uploads still reach the handler, up to this much, so they get a JSON 413
const UPLOAD_BODY_LIMIT: usize = 2 * MAX_PROFILE_PICTURE_BYTES;

pub fn router(state: AppState) -> Router {
    // Browser clients call from any origin with the hosted backend's client headers.
    // The layer answers every OPTIONS request itself.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    let liveness = state.liveness.clone();
    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let search_router = Router::new().route(
        "/semantic-search",
        post(semantic_search).fallback(method_not_allowed),
    );

    let members_router = Router::new()
        .route(
            "/members/:id/embedding",
            post(refresh_embedding).fallback(method_not_allowed),
        )
        .route(
            "/members/:id/profile-picture",
            post(upload_picture)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        );

    let enable_metrics = state.enable_metrics;
    let router = Router::new()
        .merge(status_router)
        .merge(search_router)
        .merge(members_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(cors)
        .with_state(state);

    if !enable_metrics {
        return router;
    }
    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::warn!("metrics recorder not installed, /metrics disabled: {}", e);
            router
        }
    }
}
