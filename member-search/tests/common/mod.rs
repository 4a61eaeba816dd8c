#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Once},
};

use member_search::config::Config;
use member_search::members::Member;
use member_search::server::serve;
use member_search::state::AppState;
use member_search::utils::test_utils::{
    MockEmbedder, MockMemberStore, MockObjectStore, DEFAULT_TEST_CONFIG,
};
use tokio::{net::TcpListener, sync::Notify};

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

/// The mocks behind a running test server, kept for assertions.
pub struct Backends {
    pub store: Arc<MockMemberStore>,
    pub embedder: Arc<MockEmbedder>,
    pub objects: Arc<MockObjectStore>,
}

impl Backends {
    pub fn new(members: Vec<Member>, embedder: MockEmbedder) -> Self {
        Self {
            store: Arc::new(MockMemberStore::with_members(members)),
            embedder: Arc::new(embedder),
            objects: Arc::new(MockObjectStore::default()),
        }
    }

    /// Members stored with embeddings from a working embedder, so semantic
    /// search has something to match even when `embedder` fails later.
    pub async fn embedded(members: Vec<Member>, embedder: MockEmbedder) -> Self {
        let backends = Self::new(members, embedder);
        backends.store.embed_all(&MockEmbedder::default()).await;
        backends
    }
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_backends(backends: &Backends) -> Self {
        Self::for_config(DEFAULT_TEST_CONFIG.clone(), backends).await
    }

    pub async fn for_config(config: Config, backends: &Backends) -> Self {
        setup_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        let state = AppState::new(
            &config,
            backends.store.clone(),
            backends.embedder.clone(),
            backends.objects.clone(),
        )
        .await;

        tokio::spawn(async move {
            serve(state, listener, async move { notify.notified().await })
                .await
                .unwrap()
        });

        Self { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
