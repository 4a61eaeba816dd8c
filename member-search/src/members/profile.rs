use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::{Embedder, EmbeddingError};
use crate::members::{Member, MemberStore, StoreError};
use crate::metrics_consts::{EMBEDDINGS_REFRESHED, EMBEDDING_REFRESH_FAILED};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// The text a member is embedded from: name, role, description and the
/// comma-joined skills, skipping empty parts, joined with `". "`.
pub fn profile_text(member: &Member) -> String {
    let skills = member
        .skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    [
        member.name.trim(),
        member.role.trim(),
        member.description.trim(),
        skills.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(". ")
}

/// Recomputes and stores the embedding of one member.
///
/// Returns the stored dimensionality, or `None` when the member has no
/// profile text and its embedding was cleared instead.
pub async fn refresh_member_embedding(
    embedder: &dyn Embedder,
    store: &dyn MemberStore,
    id: Uuid,
) -> Result<Option<usize>, RefreshError> {
    let member = store.fetch_member(id).await?;
    let result = store_embedding_for(embedder, store, &member).await;
    record_refresh(&result);
    result
}

async fn store_embedding_for(
    embedder: &dyn Embedder,
    store: &dyn MemberStore,
    member: &Member,
) -> Result<Option<usize>, RefreshError> {
    let text = profile_text(member);
    if text.is_empty() {
        store.set_member_embedding(member.id, None).await?;
        return Ok(None);
    }

    let embedding = embedder.embed(&text).await?;
    store.set_member_embedding(member.id, Some(&embedding)).await?;
    Ok(Some(embedding.dimensions()))
}

fn record_refresh(result: &Result<Option<usize>, RefreshError>) {
    match result {
        Ok(_) => counter!(EMBEDDINGS_REFRESHED).increment(1),
        Err(RefreshError::Store(_)) => {
            counter!(EMBEDDING_REFRESH_FAILED, "cause" => "store").increment(1)
        }
        Err(RefreshError::Embedding(_)) => {
            counter!(EMBEDDING_REFRESH_FAILED, "cause" => "embedding").increment(1)
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub refreshed: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

/// Embeds every member that currently has no embedding.
///
/// Walks the members in id order so rows that fail (or stay NULL because
/// they have no profile text) are not fetched again. A failure on one member
/// is logged and counted; only a failure to list members aborts the run.
pub async fn backfill_embeddings(
    embedder: &dyn Embedder,
    store: &dyn MemberStore,
    batch_size: i64,
) -> Result<BackfillReport, StoreError> {
    let batch_size = batch_size.max(1);
    let mut report = BackfillReport::default();
    let mut after: Option<Uuid> = None;

    loop {
        let batch = store.members_missing_embedding(after, batch_size).await?;
        let Some(last) = batch.last() else {
            break;
        };
        after = Some(last.id);

        for member in &batch {
            report.scanned += 1;
            let result = store_embedding_for(embedder, store, member).await;
            record_refresh(&result);
            match result {
                Ok(Some(_)) => report.refreshed += 1,
                Ok(None) => report.skipped_empty += 1,
                Err(e) => {
                    warn!(member_id = %member.id, "failed to backfill embedding: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            refreshed = report.refreshed,
            failed = report.failed,
            "backfill batch complete"
        );

        if (batch.len() as i64) < batch_size {
            break;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{member_fixture, MockEmbedder, MockMemberStore};

    #[test]
    fn profile_text_skips_empty_parts() {
        let mut member = member_fixture("Ada Lovelace", "Engineer", "", &["Rust", " ", "Math"]);
        assert_eq!(profile_text(&member), "Ada Lovelace. Engineer. Rust, Math");

        member.role = "  ".to_string();
        member.skills.clear();
        assert_eq!(profile_text(&member), "Ada Lovelace");
    }

    #[tokio::test]
    async fn refresh_stores_embedding() {
        let member = member_fixture("Ada", "Engineer", "Builds engines", &["Rust"]);
        let id = member.id;
        let store = MockMemberStore::with_members(vec![member]);
        let embedder = MockEmbedder::default();

        let dims = refresh_member_embedding(&embedder, &store, id).await.unwrap();

        assert_eq!(dims, Some(crate::embedding::EMBEDDING_DIMENSIONS));
        assert!(store.embedding_of(id).is_some());
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_clears_embedding_for_empty_profile() {
        let member = member_fixture(" ", "", "", &[]);
        let id = member.id;
        let store = MockMemberStore::with_members(vec![member]);
        let embedder = MockEmbedder::default();

        let dims = refresh_member_embedding(&embedder, &store, id).await.unwrap();

        assert_eq!(dims, None);
        assert!(store.embedding_of(id).is_none());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_unknown_member_is_not_found() {
        let store = MockMemberStore::default();
        let embedder = MockEmbedder::default();
        let id = Uuid::now_v7();

        let err = refresh_member_embedding(&embedder, &store, id)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Store(StoreError::MemberNotFound(m)) if m == id));
    }

    #[tokio::test]
    async fn backfill_continues_past_failures() {
        let members = vec![
            member_fixture("Ada", "Engineer", "Compilers", &["Rust"]),
            member_fixture("Grace", "Admiral", "Cobol", &["Cobol"]),
            member_fixture("", "", "", &[]),
            member_fixture("Linus", "Maintainer", "Kernels", &["C"]),
        ];
        let store = MockMemberStore::with_members(members);
        let embedder = MockEmbedder::default().failing_on("Grace");

        let report = backfill_embeddings(&embedder, &store, 2).await.unwrap();

        assert_eq!(
            report,
            BackfillReport {
                scanned: 4,
                refreshed: 2,
                skipped_empty: 1,
                failed: 1,
            }
        );
        assert_eq!(store.missing_embedding_count(), 2);
    }

    #[tokio::test]
    async fn backfill_of_empty_store_does_nothing() {
        let store = MockMemberStore::default();
        let embedder = MockEmbedder::default();

        let report = backfill_embeddings(&embedder, &store, 10).await.unwrap();
        assert_eq!(report, BackfillReport::default());
        assert_eq!(embedder.calls(), 0);
    }
}
