use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};

use common_database::{get_pool, Client as DatabaseClient};
use health::{HealthHandle, HealthRegistry};
use metrics::gauge;

use crate::{
    config::Config,
    embedding::{client::HttpEmbedder, Embedder},
    members::{MemberStore, PgMemberStore},
    metrics_consts::{PG_POOL_IDLE, PG_POOL_SIZE},
    search::SearchService,
    storage::{ObjectStore, S3ObjectStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MemberStore>,
    pub embedder: Arc<dyn Embedder>,
    pub objects: Arc<dyn ObjectStore>,
    pub search: Arc<SearchService>,
    pub liveness: HealthRegistry,
    pub default_result_limit: i64,
    pub enable_metrics: bool,
}

impl AppState {
    /// Wires the given backends together and starts the liveness loop.
    pub async fn new(
        config: &Config,
        store: Arc<dyn MemberStore>,
        embedder: Arc<dyn Embedder>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let search = Arc::new(SearchService::new(
            embedder.clone(),
            store.clone(),
            config.similarity_threshold,
        ));

        let liveness = HealthRegistry::new("liveness");
        let simple_loop = liveness
            .register("simple_loop".to_string(), Duration::from_secs(30))
            .await;
        tokio::spawn(liveness_loop(simple_loop));

        AppState {
            store,
            embedder,
            objects,
            search,
            liveness,
            default_result_limit: config.default_result_limit,
            enable_metrics: config.enable_metrics,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = match get_pool(&config.database_url, config.max_pg_connections).await {
            Ok(pool) => {
                tracing::info!("Successfully created Postgres client");
                pool
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    max_connections = config.max_pg_connections,
                    "Failed to create Postgres client"
                );
                return Err(anyhow::anyhow!("Failed to create Postgres client: {}", e));
            }
        };

        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations applied");
        }

        let db_client: Arc<dyn DatabaseClient + Send + Sync> = Arc::new(pool);
        tokio::spawn(pool_stats_loop(db_client.clone()));

        let embedder = HttpEmbedder::new(
            config.embedding_api_url.clone(),
            config.embedding_api_key.clone(),
            config.embedding_model,
            config.embedding_timeout(),
        )
        .context("Failed to create embedding client")?;

        let objects = S3ObjectStore::from_env(
            &config.s3_region,
            config.s3_endpoint.as_deref(),
            config.profile_pictures_public_url.clone(),
        )
        .await;

        Ok(Self::new(
            config,
            Arc::new(PgMemberStore::new(db_client)),
            Arc::new(embedder),
            Arc::new(objects),
        )
        .await)
    }
}

async fn liveness_loop(handle: HealthHandle) {
    loop {
        handle.report_healthy().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}

async fn pool_stats_loop(client: Arc<dyn DatabaseClient + Send + Sync>) {
    loop {
        if let Some(stats) = client.get_pool_stats() {
            gauge!(PG_POOL_SIZE).set(stats.size as f64);
            gauge!(PG_POOL_IDLE).set(stats.num_idle as f64);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
