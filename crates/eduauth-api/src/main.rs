//! # eduauth-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the EduAuth registry.
//! Binds to configurable port (default 8080).

use std::net::SocketAddr;
use std::sync::Arc;

use eduauth_api::auth::SessionStore;
use eduauth_api::blobs::BlobStore;
use eduauth_api::notify::{LogNotifier, Notifier, WebhookNotifier};
use eduauth_api::registry::{Ledger, Registry, SeedOutcome};
use eduauth_api::state::{AppConfig, AppState, LogFormat};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::debug!(?config, "configuration loaded");

    // Database is optional; without it the registry lives in memory only.
    let db_pool = eduauth_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Notifications relayed to webhook");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let registry = Registry::new(Ledger::with_pool(db_pool))
        .with_notifier(notifier)
        .with_app_base_url(&config.app_base_url);

    // Hydrate in-memory tables from the database (if connected).
    registry.hydrate().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        match registry.seed_admin(email, password.as_str()).await {
            Ok(SeedOutcome::Created(id)) => tracing::info!(user_id = %id, "admin account seeded"),
            Ok(SeedOutcome::AlreadyExists(id)) => {
                tracing::info!(user_id = %id, "admin account already present")
            }
            Err(e) => {
                tracing::error!("Admin seeding failed: {e}");
                return Err(e.into());
            }
        }
    }

    let state = AppState::new(
        registry,
        SessionStore::new(config.session_ttl()),
        BlobStore::filesystem(&config.upload_dir),
    );
    let app = eduauth_api::app_with_rate_limit(state, config.rate_limit());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("EduAuth API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
