mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod ws;

use axum::{routing::get, Router};
use std::panic;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use docs::ApiDoc;
use handlers::{health_check, ready_check};
use routes::api::create_api_routes;
use services::access::DbNoteAccess;
use state::AppState;
use ws::handler::collab_ws_handler;

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "noteroom=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every handshake will be rejected");
    }

    // Initialize database connection if URL is provided
    if let Some(db_url) = &config.db_url {
        match db::notedb::init_db(db_url).await {
            Ok(_) => info!("Database initialized successfully"),
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Note storage will not be available");
            }
        }
    } else {
        warn!("No database URL configured - note storage will not be available");
    }

    let server_address = config.server_address();
    let cors_origins = config.cors_origins.clone();
    config::init_config(config);

    // Shared collaboration state over the database-backed access oracle
    let state = Arc::new(AppState::new(Arc::new(DbNoteAccess)));

    // CORS: explicit origins when configured, permissive otherwise
    let cors = match &cors_origins {
        Some(origins) => {
            let origins: Vec<axum::http::HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    // Create API routes
    let api_routes = create_api_routes(state.clone());

    // Collaboration WebSocket
    let ws_routes = Router::new()
        .route("/ws", get(collab_ws_handler))
        .with_state(state.clone());

    // Combine all routes
    let app_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        // Mount API routes
        .nest("/api", api_routes)
        // Mount the collaboration socket
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the HTTP server
    let listener = tokio::net::TcpListener::bind(&server_address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", server_address));

    info!("🚀 Server running on http://{}", server_address);
    info!("📡 Collaboration WebSocket available at ws://{}/ws", server_address);
    info!("📚 Swagger UI available at http://{}/swagger", server_address);

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
