mod auth;
mod config;
mod db;
mod docs;
mod error;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod websocket;
mod ws;

use config::Config;
use db::dbroom::DbRoom;
use db::memstore::MemoryStore;
use db::{DurableStore, MembershipChecker};
use routes::create_app;
use services::auth_service::JwtVerifier;
use services::membership_service::CachedMembership;
use state::AppState;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use ws::timer::TokioTimer;

const RATE_WINDOW_SWEEP: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before logging so LOG_LEVEL can shape the filter
    let loaded = Config::load();
    let log_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "debug".to_string());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("colabri_room={log_level},tower_http={log_level},axum::rejection=trace,info").into()
        }))
        .init();

    info!("Starting server...");

    let config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    info!("Service {} running in {} mode", config.cloud_service_name, config.environment);

    // Pick the durable store
    let (store, membership): (Arc<dyn DurableStore>, Arc<dyn MembershipChecker>) = match &config.db_url {
        Some(db_url) => match DbRoom::new(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                let db = Arc::new(db);
                (db.clone() as Arc<dyn DurableStore>, db as Arc<dyn MembershipChecker>)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return;
            }
        },
        None => {
            warn!("No database URL configured - documents and chat live in memory and every user may join every room");
            if !config.is_development() {
                error!("Running {} without a database outside development", config.environment);
            }
            let memory = Arc::new(MemoryStore::open());
            (memory.clone() as Arc<dyn DurableStore>, memory as Arc<dyn MembershipChecker>)
        }
    };
    let membership: Arc<dyn MembershipChecker> =
        Arc::new(CachedMembership::new(membership, config.membership_cache_ttl()));

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every connection will be refused");
    }
    let auth = Arc::new(JwtVerifier::new(config.auth_jwt_secret.clone()));

    let address = config.server_address();
    let state = Arc::new(AppState::new(config, store, membership, auth, Arc::new(TokioTimer)));

    // Drop elapsed chat rate windows now and then
    let sweeper = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_WINDOW_SWEEP);
            loop {
                interval.tick().await;
                state.chat_limiter.cleanup();
            }
        })
    };

    let app_routes = create_app(state.clone());

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            return;
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    sweeper.abort();
    let flushed = state.registry.flush_all().await;
    info!("Flushed {} rooms on shutdown", flushed);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
