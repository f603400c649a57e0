//! Portcullis - session-based authentication server

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portcullis::{
    api::{self, AppState},
    auth::{FacebookProvider, IdentityProvider},
    config::Config,
    db::{self, DatabasePool},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portcullis=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Portcullis...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let pending = db::migrations::pending_count(&pool).await?;
    tracing::info!(pending, "Checking database migrations");
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Facebook login is only offered when the app credentials are present
    let provider: Option<Arc<dyn IdentityProvider>> = if config.facebook.is_configured() {
        tracing::info!("Facebook login enabled");
        Some(Arc::new(FacebookProvider::from_config(&config.facebook)?))
    } else {
        tracing::info!("Facebook login disabled: no client id/secret configured");
        None
    };

    let state = AppState::build(&config, pool.clone(), provider)?;
    tracing::info!(
        ttl_seconds = state.sessions.ttl_seconds(),
        deserialize = ?config.session.deserialize,
        "Session store initialized"
    );

    let app = api::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Database pool closed");

    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
