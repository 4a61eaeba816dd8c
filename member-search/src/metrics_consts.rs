// Search
pub const SEARCH_REQUESTS: &str = "member_search_requests_total";
pub const SEARCH_FALLBACKS: &str = "member_search_fallbacks_total";
pub const SEARCH_FAILURES: &str = "member_search_failures_total";
pub const SEARCH_RESULT_COUNT: &str = "member_search_result_count";
pub const SEARCH_TIME: &str = "member_search_time";

// Embedding endpoint
pub const EMBEDDING_REQUEST_TIME: &str = "member_search_embedding_request_time";
pub const EMBEDDINGS_GENERATED: &str = "member_search_embeddings_generated_total";
pub const EMBEDDING_FAILED: &str = "member_search_embedding_failed_total";
pub const EMBEDDING_INPUT_TRUNCATED: &str = "member_search_embedding_input_truncated_total";

// Profile maintenance
pub const EMBEDDINGS_REFRESHED: &str = "member_search_embeddings_refreshed_total";
pub const EMBEDDING_REFRESH_FAILED: &str = "member_search_embedding_refresh_failed_total";
pub const PROFILE_PICTURES_UPLOADED: &str = "member_search_profile_pictures_uploaded_total";
pub const PROFILE_PICTURE_UPLOAD_FAILED: &str = "member_search_profile_picture_upload_failed_total";
pub const ORPHANED_OBJECTS_REMOVED: &str = "member_search_orphaned_objects_removed_total";

// Database pool
pub const PG_POOL_SIZE: &str = "member_search_pg_pool_size";
pub const PG_POOL_IDLE: &str = "member_search_pg_pool_idle";
