pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod time;
pub mod workers;

use axum::http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::{DatabaseProxy, DbInitError};
use crate::services::llm_provider::{LLMConfig, LLMProvider};
use crate::state::AppState;

/// Full HTTP stack for an already-built state.
pub fn build_router(state: AppState) -> axum::Router {
    let cors = cors_layer(&state.config().frontend_url);
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Connects and migrates the database, then builds the router with the LLM
/// disabled. Used by tests and tooling; `main` wires the real provider.
pub async fn create_app(config: Config) -> Result<axum::Router, DbInitError> {
    let db = DatabaseProxy::connect(&config).await?;
    let state = AppState::new(config, db, LLMProvider::new(LLMConfig::disabled()));
    Ok(build_router(state))
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    match frontend_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(
                frontend_url,
                "FRONTEND_URL is not a valid origin; using permissive CORS"
            );
            CorsLayer::permissive()
        }
    }
}
