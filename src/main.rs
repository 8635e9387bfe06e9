use pairup_match::config::Settings;
use pairup_match::core::MatchEngine;
use pairup_match::services::{IntakeQueue, RedisNotifier, RedisStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn io_error<E: std::fmt::Display>(e: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)))
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting PairUp matchmaking service...");

    // Load configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Configuration loaded successfully");

    // Connect the shared request store
    let store = Arc::new(
        RedisStore::connect(&settings.store.redis_url)
            .await
            .map_err(io_error)?,
    );

    info!("Request store connected");

    // Connect the notification sink
    let notifier = Arc::new(
        RedisNotifier::connect(&settings.store.redis_url)
            .await
            .map_err(io_error)?,
    );

    // Connect the intake channel
    let queue = IntakeQueue::connect(&settings.queue.redis_url, &settings.queue.name)
        .await
        .map_err(io_error)?;

    let engine = MatchEngine::new(
        store,
        notifier,
        settings.matching.wait(),
        settings.matching.entry_ttl(),
    );

    info!(
        "Matchmaking engine ready (wait: {}s), consuming from '{}'",
        settings.matching.wait_secs, settings.queue.name
    );

    engine.run_worker(&queue).await.map_err(io_error)
}
