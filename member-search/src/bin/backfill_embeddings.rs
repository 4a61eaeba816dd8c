//! Embeds every member whose embedding is NULL, then exits.
//!
//! Run after bulk imports, or after profile edits cleared embeddings while
//! the embedding endpoint was down.

use anyhow::Context;
use envconfig::Envconfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use member_search::config::Config;
use member_search::members::profile::backfill_embeddings;
use member_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    let config = Config::init_from_env()?;
    let state = AppState::from_config(&config).await?;

    let report = backfill_embeddings(
        state.embedder.as_ref(),
        state.store.as_ref(),
        config.backfill_batch_size,
    )
    .await
    .context("backfill aborted")?;

    tracing::info!(
        scanned = report.scanned,
        refreshed = report.refreshed,
        skipped_empty = report.skipped_empty,
        failed = report.failed,
        "backfill finished"
    );

    if report.failed > 0 {
        anyhow::bail!("{} members could not be embedded", report.failed);
    }
    Ok(())
}
