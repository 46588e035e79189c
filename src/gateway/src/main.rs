use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kiln_core::{
    build_router, spawn_expiry_sweeper, KilnConfig, ServerConfig, SqliteStore, StoryEngine,
    SystemClock,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .init();

    let defaults = ServerConfig::default();

    let config = ServerConfig {
        bind: parse_socket("KILN_BIND", defaults.bind),
        db_path: env::var("KILN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path),
        sweep_interval: parse_duration("KILN_SWEEP_SECS", defaults.sweep_interval),
        view_record_timeout: parse_millis("KILN_VIEW_TIMEOUT_MS", defaults.view_record_timeout),
        feed_limit: parse_usize("KILN_FEED_LIMIT", defaults.feed_limit),
    };

    let kiln_config = match KilnConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load kiln config, using defaults");
            KilnConfig::default()
        }
    };
    tracing::debug!(
        ttl_hours = kiln_config.stories.ttl_hours,
        max_write_attempts = kiln_config.views.max_write_attempts,
        "story settings"
    );

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    tracing::info!(path = %config.db_path.display(), "story store opened");

    let engine = StoryEngine::new(store, Arc::new(SystemClock), &kiln_config);
    let _sweeper = spawn_expiry_sweeper(engine.lifecycle.clone(), config.sweep_interval);

    let app = build_router(config.clone(), engine, kiln_config.analytics.clone());

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_socket(key: &str, default: SocketAddr) -> SocketAddr {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_duration(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_millis(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map(Duration::from_millis).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(v) => v.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn tracing_filter() -> tracing_subscriber::EnvFilter {
    let explicit = env::var("KILN_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if matches!(
        env::var("KILN_DEBUG").as_deref(),
        Ok("1" | "true" | "TRUE" | "yes" | "YES")
    ) {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("info")
}
