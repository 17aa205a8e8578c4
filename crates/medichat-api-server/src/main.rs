use anyhow::Result;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

mod config;
mod database;
mod handlers;
mod models;
mod services;
mod utils;

use config::Settings;
use database::{DbPool, Repository};
use services::{
    ClinicLocator, ConversationManager, EmbeddingService, GeoService, KnowledgeService,
    LlmService, SymptomChecker,
};
use services::conversation::manager::LlmProvider;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,medichat_api_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting Medical Chat API Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Initialize database pool and schema
    let db_pool = DbPool::new(&settings.database).await?;
    let repository = Arc::new(Repository::new(db_pool));
    repository.ensure_schema(settings.embedding.dimension).await?;
    info!("Database connection established");

    // Initialize external service clients
    let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone()));
    let llm_service: Arc<dyn LlmProvider> = Arc::new(LlmService::new(settings.llm.clone()));
    let knowledge_service = Arc::new(KnowledgeService::new(settings.knowledge.clone()));
    let geo_service = Arc::new(GeoService::new(settings.geocoding.clone()));

    // Initialize handlers
    let symptom_checker = SymptomChecker::new(knowledge_service, llm_service.clone());
    let clinic_locator = ClinicLocator::new(
        geo_service,
        settings.geocoding.radius_meters,
        settings.geocoding.max_results,
        Duration::from_millis(settings.geocoding.rate_limit_ms),
    );

    let manager = Arc::new(ConversationManager::new(
        embedding_service,
        llm_service,
        repository.clone(),
        symptom_checker,
        clinic_locator,
        settings.retrieval.top_k,
    ));

    // Periodic session cleanup
    let cleanup_manager = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_manager.cleanup_expired_sessions();
        }
    });

    // Build router
    let app = build_router(manager, repository);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(manager: Arc<ConversationManager>, repository: Arc<Repository>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/api/sessions", post(handlers::session::create_session_handler))
        .route("/api/chat", post(handlers::chat::chat_handler))
        .layer(Extension(manager))
        .layer(Extension(repository))
        // CORS
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}
