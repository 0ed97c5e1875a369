use anyhow::Result;
use axum::routing::get;
use axum::Json;
use clap::Parser;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("duet=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dir(&config.database.url);

    let db = duet_db::create_pool(&config.database.url, config.database.max_connections).await?;
    duet_db::run_migrations(&db).await?;

    let state = duet_core::AppState::new(
        db,
        duet_core::AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            handshake_timeout_secs: config.gateway.handshake_timeout_secs,
            worker_id: config.gateway.worker_id,
        },
    );
    let shutdown_notify = state.shutdown.clone();

    let app = duet_ws::gateway_router()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "ok", "service": "duet"})) }),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        "duet-server listening on http://{} (db: {})",
        config.server.bind_address,
        config.database.url
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Make sure the sqlite file's parent directory exists before the pool
/// tries to create the database.
fn ensure_data_dir(database_url: &str) {
    if let Some(db_path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), err);
                }
            }
        }
    }
}
