//! NeighborNexus API Server
//!
//! HTTP and WebSocket server in front of the match ranker and the
//! notification hub.

mod config;
mod error;
mod routes;

use axum::http::{header, Method};
use nexus_embedding::{Embedder, EmbeddingClient};
use nexus_services::{Authenticator, EntityStore, HmacAuthenticator, Hub, MatchingService};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;

/// Embedding dimension of the supported OpenAI models
const EMBEDDING_DIMENSION: usize = 1536;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub service: MatchingService,
    pub authenticator: Arc<dyn Authenticator>,
    pub embedding_available: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nexus_api=debug,nexus_services=debug")),
        )
        .init();

    info!("Starting NeighborNexus API");

    let config = AppConfig::from_env()?;
    if config.using_dev_secret {
        warn!("AUTH_SECRET not set, using the development secret");
    }

    let embedder = EmbeddingClient::with_model(
        config.openai_api_key.clone(),
        config.embedding_model.clone(),
        EMBEDDING_DIMENSION,
    );
    let embedding_available = embedder.is_available();
    if embedding_available {
        info!("Embedding client ready ({})", embedder.model());
    } else {
        info!("No OPENAI_API_KEY found - new entities will be stored without embeddings");
    }

    info!("Initializing entity store at: {}", config.db_path);
    let store = Arc::new(EntityStore::new(&config.db_path)?);

    let hub = Arc::new(Hub::new(config.hub.clone()));
    let authenticator: Arc<dyn Authenticator> =
        Arc::new(HmacAuthenticator::new(config.auth_secret.clone()));
    let service = MatchingService::new(
        store,
        Arc::new(embedder),
        hub.clone(),
        config.spatial_resolution,
    );

    let state = AppState {
        hub: hub.clone(),
        service,
        authenticator,
        embedding_available,
    };

    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    Ok(())
}

/// Resolve on Ctrl+C, closing every hub connection first
async fn shutdown_signal(hub: Arc<Hub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    hub.shutdown();
}
