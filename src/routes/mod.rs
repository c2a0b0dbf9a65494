mod access;
mod accounts;
mod artifacts;
mod billing;
mod chats;
mod classes;
mod clips;
mod dashboard;
mod documents;
mod exercises;
mod health;
mod homework;
mod intake;
mod profiles;
mod proof;
mod topics;

pub use intake::INTAKE_SECRET_HEADER;
pub use topics::RELEASE_DISPLAY_DELAY_MS;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::auth::require_auth;
use crate::middleware::rate_limit::auth_rate_limit_middleware;
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/api/auth", accounts::router())
        .nest("/api/profiles", profiles::router())
        .nest("/api/classes", classes::router())
        .nest("/api/topics", topics::router())
        .merge(dashboard::router())
        .nest("/api/homework", homework::router())
        .nest("/api/chats", chats::router())
        .nest("/api/documents", documents::router())
        .nest("/api/clips", clips::router())
        .nest("/api/exercises", exercises::router())
        .nest("/api/proof-events", proof::router())
        .nest("/api/artifacts", artifacts::router())
        .nest("/api/billing", billing::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new()
        .nest("/health", health::router())
        .nest("/api/auth", accounts::public_router())
        .nest("/api/intake", intake::router())
        .nest("/api/billing", billing::webhook_router());

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit_middleware,
        ))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found").into_response()
}
