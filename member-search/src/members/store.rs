use std::sync::Arc;

use async_trait::async_trait;
use common_database::{
    is_connection_error, is_timeout_error, is_undefined_object_error, Client as DatabaseClient,
    CustomDatabaseError,
};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::members::models::{Member, MemberMatch};

pub type PostgresClient = Arc<dyn DatabaseClient + Send + Sync>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("timed out while querying the database")]
    Timeout,
    #[error("database schema is missing an object: {0}")]
    MissingSchema(sqlx::Error),
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("member {0} not found")]
    MemberNotFound(Uuid),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if is_timeout_error(&e) {
            StoreError::Timeout
        } else if is_connection_error(&e) {
            StoreError::DatabaseUnavailable
        } else if is_undefined_object_error(&e) {
            StoreError::MissingSchema(e)
        } else {
            StoreError::Database(e)
        }
    }
}

impl From<CustomDatabaseError> for StoreError {
    fn from(e: CustomDatabaseError) -> Self {
        match e {
            CustomDatabaseError::Other(e) => e.into(),
            CustomDatabaseError::Timeout(_) => StoreError::Timeout,
        }
    }
}

/// Persistence for member profiles, as used by search and profile maintenance.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Members whose cosine similarity to `query` is at least
    /// `similarity_threshold`, closest first, at most `match_count` rows.
    async fn match_members(
        &self,
        query: &Embedding,
        match_count: i64,
        similarity_threshold: f64,
    ) -> Result<Vec<MemberMatch>, StoreError>;

    /// Members with any of `terms` as a case-insensitive substring of their
    /// name, role, description or skills. Unranked, at most `limit` rows.
    async fn search_members_text(
        &self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<Member>, StoreError>;

    async fn fetch_member(&self, id: Uuid) -> Result<Member, StoreError>;

    /// Keyset page of members without an embedding, ordered by id, strictly after `after`.
    async fn members_missing_embedding(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Member>, StoreError>;

    async fn set_member_embedding(
        &self,
        id: Uuid,
        embedding: Option<&Embedding>,
    ) -> Result<(), StoreError>;

    async fn set_profile_picture_url(&self, id: Uuid, url: &str) -> Result<(), StoreError>;
}

pub struct PgMemberStore {
    client: PostgresClient,
}

impl PgMemberStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

const MEMBER_COLUMNS: &str = r#"
    m.id, m.name, m.email, m.role, m.description, m.skills,
    m.profile_picture_url, m.team_id, t.name AS team_name
"#;

/// `%term%` with LIKE metacharacters escaped, for `ILIKE ANY($1)`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl MemberStore for PgMemberStore {
    #[instrument(skip_all, fields(match_count = match_count, threshold = similarity_threshold))]
    async fn match_members(
        &self,
        query: &Embedding,
        match_count: i64,
        similarity_threshold: f64,
    ) -> Result<Vec<MemberMatch>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let rows = sqlx::query_as::<_, MemberMatch>(
            r#"
            SELECT id, name, email, role, description, skills, profile_picture_url,
                   team_id, team_name, match_score, distance
            FROM match_members($1::vector, $2, $3)
            "#,
        )
        .bind(query.to_pgvector())
        .bind(i32::try_from(match_count).unwrap_or(i32::MAX))
        .bind(similarity_threshold)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    #[instrument(skip_all, fields(terms = terms.len(), limit = limit))]
    async fn search_members_text(
        &self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<Member>, StoreError> {
        let patterns: Vec<String> = terms.iter().map(|t| like_pattern(t)).collect();
        let query = format!(
            r#"
            SELECT {MEMBER_COLUMNS}
            FROM members m
            LEFT JOIN teams t ON t.id = m.team_id
            WHERE m.name ILIKE ANY($1)
               OR m.role ILIKE ANY($1)
               OR m.description ILIKE ANY($1)
               OR array_to_string(m.skills, ' ') ILIKE ANY($1)
            ORDER BY m.name
            LIMIT $2
            "#
        );

        let mut conn = self.client.get_connection().await?;
        let rows = sqlx::query_as::<_, Member>(&query)
            .bind(patterns)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn fetch_member(&self, id: Uuid) -> Result<Member, StoreError> {
        let query = format!(
            r#"
            SELECT {MEMBER_COLUMNS}
            FROM members m
            LEFT JOIN teams t ON t.id = m.team_id
            WHERE m.id = $1
            "#
        );

        let mut conn = self.client.get_connection().await?;
        sqlx::query_as::<_, Member>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::MemberNotFound(id))
    }

    async fn members_missing_embedding(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Member>, StoreError> {
        let query = format!(
            r#"
            SELECT {MEMBER_COLUMNS}
            FROM members m
            LEFT JOIN teams t ON t.id = m.team_id
            WHERE m.embedding IS NULL
              AND ($1::uuid IS NULL OR m.id > $1)
            ORDER BY m.id
            LIMIT $2
            "#
        );

        let mut conn = self.client.get_connection().await?;
        let rows = sqlx::query_as::<_, Member>(&query)
            .bind(after)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn set_member_embedding(
        &self,
        id: Uuid,
        embedding: Option<&Embedding>,
    ) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection().await?;
        let result = sqlx::query("UPDATE members SET embedding = $2::vector WHERE id = $1")
            .bind(id)
            .bind(embedding.map(Embedding::to_pgvector))
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MemberNotFound(id));
        }
        Ok(())
    }

    async fn set_profile_picture_url(&self, id: Uuid, url: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection().await?;
        let result = sqlx::query("UPDATE members SET profile_picture_url = $2 WHERE id = $1")
            .bind(id)
            .bind(url)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MemberNotFound(id));
        }
        Ok(())
    }
}
