use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use member_search::embedding::{Embedding, EMBEDDING_DIMENSIONS};
use member_search::members::profile::backfill_embeddings;
use member_search::members::{MemberStore, PgMemberStore};
use member_search::utils::test_utils::MockEmbedder;

fn direction(weights: &[(usize, f32)]) -> Embedding {
    let mut values = vec![0.0; EMBEDDING_DIMENSIONS];
    for (index, weight) in weights {
        values[*index] = *weight;
    }
    Embedding::new(values).unwrap()
}

async fn insert_member(
    db: &PgPool,
    name: &str,
    role: &str,
    skills: &[&str],
    embedding: Option<&Embedding>,
) -> Uuid {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    sqlx::query_scalar(
        r#"
        INSERT INTO members (name, email, role, description, skills, embedding)
        VALUES ($1, $2, $3, '', $4, $5::vector)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(role)
    .bind(skills.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    .bind(embedding.map(Embedding::to_pgvector))
    .fetch_one(db)
    .await
    .unwrap()
}

async fn has_embedding(db: &PgPool, id: Uuid) -> bool {
    sqlx::query_scalar("SELECT embedding IS NOT NULL FROM members WHERE id = $1")
        .bind(id)
        .fetch_one(db)
        .await
        .unwrap()
}

fn store(db: &PgPool) -> PgMemberStore {
    PgMemberStore::new(Arc::new(db.clone()))
}

#[sqlx::test(migrations = "./migrations")]
async fn match_members_applies_threshold_and_orders_by_distance(db: PgPool) {
    insert_member(&db, "Orthogonal", "", &[], Some(&direction(&[(1, 1.0)]))).await;
    insert_member(&db, "Close", "", &[], Some(&direction(&[(0, 1.0), (1, 1.0)]))).await;
    insert_member(&db, "Exact", "", &[], Some(&direction(&[(0, 1.0)]))).await;
    insert_member(&db, "Unembedded", "", &[], None).await;

    let store = store(&db);
    let query = direction(&[(0, 1.0)]);

    let matches = store.match_members(&query, 10, 0.5).await.unwrap();
    let names: Vec<&str> = matches.iter().map(|m| m.member.name.as_str()).collect();
    assert_eq!(names, vec!["Exact", "Close"]);
    assert!((matches[0].match_score - 1.0).abs() < 1e-4);
    assert!((matches[1].match_score - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-4);
    assert!(matches[0].distance <= matches[1].distance);

    let matches = store.match_members(&query, 1, 0.5).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].member.name, "Exact");

    // Rows without an embedding never match, however low the threshold
    let matches = store.match_members(&query, 10, -1.0).await.unwrap();
    assert_eq!(matches.len(), 3);
    assert!(matches.iter().all(|m| m.member.name != "Unembedded"));
}

#[sqlx::test(migrations = "./migrations")]
async fn text_search_matches_wildcards_literally(db: PgPool) {
    insert_member(&db, "Percent", "Owns 100% of the pipeline", &[], None).await;
    insert_member(&db, "Thousand", "Owns 1000 dashboards", &[], None).await;
    insert_member(&db, "Snake", "Linter author", &["snake_case"], None).await;
    insert_member(&db, "Camel", "Linter author", &["snakeXcase"], None).await;

    let store = store(&db);

    let members = store
        .search_members_text(&["100%".to_string()], 10)
        .await
        .unwrap();
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Percent"]);

    let members = store
        .search_members_text(&["SNAKE_CASE".to_string()], 10)
        .await
        .unwrap();
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Snake"]);

    let members = store
        .search_members_text(&["linter".to_string(), "owns".to_string()], 3)
        .await
        .unwrap();
    assert_eq!(members.len(), 3);
}

#[sqlx::test(migrations = "./migrations")]
async fn profile_edits_clear_the_stored_embedding(db: PgPool) {
    let embedding = direction(&[(0, 1.0)]);
    let id = insert_member(&db, "Ada", "Engineer", &["Rust"], Some(&embedding)).await;

    sqlx::query("UPDATE members SET role = 'Manager' WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await
        .unwrap();
    assert!(!has_embedding(&db, id).await);

    let store = store(&db);
    store
        .set_member_embedding(id, Some(&direction(&[(2, 1.0)])))
        .await
        .unwrap();
    assert!(has_embedding(&db, id).await);

    // Unrelated columns leave the embedding alone
    store
        .set_profile_picture_url(id, "https://storage.test/ada.png")
        .await
        .unwrap();
    assert!(has_embedding(&db, id).await);

    let member = store.fetch_member(id).await.unwrap();
    assert_eq!(member.role, "Manager");
    assert_eq!(
        member.profile_picture_url.as_deref(),
        Some("https://storage.test/ada.png")
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn missing_embeddings_are_paged_by_id(db: PgPool) {
    for i in 0..5 {
        insert_member(&db, &format!("Pending {i}"), "Engineer", &[], None).await;
    }
    let embedded = insert_member(
        &db,
        "Done",
        "Engineer",
        &[],
        Some(&direction(&[(0, 1.0)])),
    )
    .await;

    let store = store(&db);
    let mut seen: Vec<Uuid> = Vec::new();
    let mut after = None;
    let mut page_sizes = Vec::new();
    loop {
        let page = store.members_missing_embedding(after, 2).await.unwrap();
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        page_sizes.push(page.len());
        seen.extend(page.iter().map(|m| m.id));
    }

    assert_eq!(page_sizes, vec![2, 2, 1]);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(!seen.contains(&embedded));
}

#[sqlx::test(migrations = "./migrations")]
async fn backfill_embeds_every_member_without_one(db: PgPool) {
    for i in 0..3 {
        insert_member(&db, &format!("Pending {i}"), "React developer", &["React"], None).await;
    }
    let failing = insert_member(&db, "Broken", "Poison pill", &[], None).await;

    let store = store(&db);
    let embedder = MockEmbedder::default().failing_on("Poison");
    let report = backfill_embeddings(&embedder, &store, 2).await.unwrap();

    assert_eq!(report.scanned, 4);
    assert_eq!(report.refreshed, 3);
    assert_eq!(report.failed, 1);
    assert!(!has_embedding(&db, failing).await);

    let remaining = store.members_missing_embedding(None, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, failing);
}
