use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{Embedder, Embedding, EmbeddingError, EMBEDDING_DIMENSIONS};
use crate::members::profile::profile_text;
use crate::members::{Member, MemberMatch, MemberStore, StoreError};
use crate::search::semantic::cosine_similarity;
use crate::storage::{ObjectStore, ObjectStoreError};

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_for_test);

pub fn member_fixture(name: &str, role: &str, description: &str, skills: &[&str]) -> Member {
    let email_local = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(".");
    Member {
        id: Uuid::now_v7(),
        name: name.to_string(),
        email: format!("{email_local}@example.com"),
        role: role.to_string(),
        description: description.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        profile_picture_url: None,
        team_id: None,
        team_name: None,
    }
}

/// Hashed bag-of-words vector: texts sharing words point in similar
/// directions, which is all search tests need from a model.
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut values = vec![0.0f32; EMBEDDING_DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        values[(hash % EMBEDDING_DIMENSIONS as u64) as usize] += 1.0;
    }
    values
}

#[derive(Default)]
pub struct MockEmbedder {
    fail_all: bool,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fails only for texts containing `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail = self.fail_all || self.fail_on.as_deref().is_some_and(|n| text.contains(n));
        if fail {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "mock embedder unavailable".to_string(),
            });
        }
        Embedding::new(bag_of_words(text))
    }
}

struct StoredMember {
    member: Member,
    embedding: Option<Embedding>,
}

/// In-memory [`MemberStore`] with the same matching rules as the SQL
/// implementation, plus switches to make each kind of call fail.
#[derive(Default)]
pub struct MockMemberStore {
    rows: Mutex<Vec<StoredMember>>,
    fail_similarity: AtomicBool,
    fail_text: AtomicBool,
    fail_writes: AtomicBool,
    match_calls: AtomicUsize,
    text_calls: AtomicUsize,
}

impl MockMemberStore {
    pub fn with_members(members: Vec<Member>) -> Self {
        let store = Self::default();
        store
            .rows
            .lock()
            .unwrap()
            .extend(members.into_iter().map(|member| StoredMember {
                member,
                embedding: None,
            }));
        store
    }

    /// Embeds every member with `embedder`, as the backfill would.
    pub async fn embed_all(&self, embedder: &dyn Embedder) {
        let members: Vec<Member> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.member.clone())
            .collect();
        for member in members {
            let text = profile_text(&member);
            if let Ok(embedding) = embedder.embed(&text).await {
                self.put_embedding(member.id, Some(embedding));
            }
        }
    }

    fn put_embedding(&self, id: Uuid, embedding: Option<Embedding>) -> bool {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|r| r.member.id == id) {
            Some(row) => {
                row.embedding = embedding;
                true
            }
            None => false,
        }
    }

    pub fn member(&self, id: Uuid) -> Option<Member> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.member.id == id)
            .map(|r| r.member.clone())
    }

    pub fn embedding_of(&self, id: Uuid) -> Option<Embedding> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.member.id == id)
            .and_then(|r| r.embedding.clone())
    }

    pub fn missing_embedding_count(&self) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.embedding.is_none())
            .count()
    }

    pub fn fail_similarity(&self) {
        self.fail_similarity.store(true, Ordering::SeqCst);
    }

    pub fn fail_text(&self) {
        self.fail_text.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::DatabaseUnavailable);
        }
        Ok(())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl MemberStore for MockMemberStore {
    async fn match_members(
        &self,
        query: &Embedding,
        match_count: i64,
        similarity_threshold: f64,
    ) -> Result<Vec<MemberMatch>, StoreError> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_similarity.load(Ordering::SeqCst) {
            return Err(StoreError::DatabaseUnavailable);
        }

        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<MemberMatch> = rows
            .iter()
            .filter_map(|r| {
                let embedding = r.embedding.as_ref()?;
                let similarity = cosine_similarity(query.as_slice(), embedding.as_slice());
                (similarity >= similarity_threshold).then(|| MemberMatch {
                    member: r.member.clone(),
                    match_score: similarity,
                    distance: 1.0 - similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(usize::try_from(match_count).unwrap_or(0));
        Ok(matches)
    }

    async fn search_members_text(
        &self,
        terms: &[String],
        limit: i64,
    ) -> Result<Vec<Member>, StoreError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_text.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }

        let rows = self.rows.lock().unwrap();
        let mut members: Vec<Member> = rows
            .iter()
            .map(|r| &r.member)
            .filter(|m| {
                let skills = m.skills.join(" ");
                let fields = [&m.name, &m.role, &m.description, &skills];
                terms
                    .iter()
                    .any(|t| fields.iter().any(|f| contains_ignore_case(f, t)))
            })
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(members)
    }

    async fn fetch_member(&self, id: Uuid) -> Result<Member, StoreError> {
        self.member(id).ok_or(StoreError::MemberNotFound(id))
    }

    async fn members_missing_embedding(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Member>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let mut members: Vec<Member> = rows
            .iter()
            .filter(|r| r.embedding.is_none())
            .filter(|r| after.map_or(true, |after| r.member.id > after))
            .map(|r| r.member.clone())
            .collect();
        members.sort_by_key(|m| m.id);
        members.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(members)
    }

    async fn set_member_embedding(
        &self,
        id: Uuid,
        embedding: Option<&Embedding>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.put_embedding(id, embedding.cloned()) {
            Ok(())
        } else {
            Err(StoreError::MemberNotFound(id))
        }
    }

    async fn set_profile_picture_url(&self, id: Uuid, url: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.member.id == id)
            .ok_or(StoreError::MemberNotFound(id))?;
        row.member.profile_picture_url = Some(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    fail_put: AtomicBool,
    put_calls: AtomicUsize,
}

impl MockObjectStore {
    pub fn fail_put(&self) {
        self.fail_put.store(true, Ordering::SeqCst);
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Content type of a stored object, looked up by `bucket/key`.
    pub fn content_type_of(&self, path: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, content_type)| content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::OperationFailed("bucket unavailable".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&format!("{bucket}/{key}"));
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("https://storage.test/{bucket}/{key}")
    }
}
