use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowwatch_common::Config;
use flowwatch_pipeline::{AlertLog, Extractor, FileCursorStore, Pipeline, Scorer};
use scoring_client::ScoringClient;
use search_client::SearchClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("flowwatch=info".parse()?)
                .add_directive("search_client=info".parse()?)
                .add_directive("scoring_client=info".parse()?),
        )
        .init();

    info!("Flowwatch run starting...");

    // Load config
    let config = Config::from_env()?;
    config.log_redacted();

    let search = SearchClient::new(
        &config.elastic_request_url,
        &config.elastic_username,
        &config.elastic_password,
        config.http_timeout,
        config.elastic_accept_invalid_certs,
    )?;
    let scoring = ScoringClient::new(&config.predict_request_url, config.http_timeout)?;
    let cursor = FileCursorStore::new(&config.cursor_file);

    let pipeline = Pipeline::new(
        Extractor::new(Arc::new(search), Arc::new(cursor)),
        Scorer::new(Arc::new(scoring)),
        AlertLog::in_dir(&config.alert_log_dir),
    )
    .with_policy(config.error_policy)
    .with_lock(&config.lock_file);

    let stats = pipeline.run().await?;

    info!("Flowwatch run finished. {stats}");
    Ok(())
}
