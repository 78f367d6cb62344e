mod config;
mod db;
mod frame;
mod item;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use crate::services::history::{HistoryArchive, MemoryHistoryArchive, PgHistoryArchive};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let port = config.port;

    // History archive (non-fatal: an in-process archive is used without a database).
    let archive: Arc<dyn HistoryArchive> = match &config.database_url {
        Some(database_url) => {
            let pool = db::init_pool(database_url)
                .await
                .expect("database init failed");
            tracing::info!("history archive: postgres");
            Arc::new(PgHistoryArchive::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; history is kept in memory and lost on restart");
            Arc::new(MemoryHistoryArchive::new())
        }
    };

    let state = state::AppState::new(archive, config);

    // Spawn background tasks.
    let _reset = services::reset::spawn_reset_scheduler(state.clone());
    let _stats = services::stats::spawn_stats_reporter(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "unwrap-rooms listening");
    axum::serve(listener, app).await.expect("server failed");
}
