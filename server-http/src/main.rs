use axum::ServiceExt;
use axum::extract::Request;
use seed::seed_backend;
use server_http::{AppState, build_app};
use shared::config::{Config, Environment};
use shared::logging;
use std::sync::Arc;
use storage_engine::{MemoryObjectStorage, MemoryStoryBackend, MokaSessionStore};
use taleshelf::AppContext;
use tracing::info;

mod seed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file (if exists)
    let dotenv = dotenvy::dotenv();

    logging::init(Environment::from_env());

    match dotenv {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    info!(environment = ?config.environment, "Starting story site HTTP server...");

    let backend = Arc::new(MemoryStoryBackend::new());
    let sessions = Arc::new(MokaSessionStore::with_defaults());
    seed_backend(&backend, &sessions, &config).await;

    let storage = Arc::new(MemoryObjectStorage::new(config.public_storage_url.clone()));
    let context = AppContext::bootstrap(&config, backend, storage)?;
    let state = AppState::new(context, sessions);

    let app = build_app(state, &config);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("HTTP Server listening on http://{}", address);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
