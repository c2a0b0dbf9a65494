use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthError;
use crate::response::json_error;
use crate::state::AppState;

/// Rejects the request with 401 unless it carries a live session. On
/// success the [`crate::auth::AuthUser`] is placed in the request
/// extensions for handlers to extract.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = crate::auth::extract_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication required")
            .into_response();
    };

    match crate::auth::verify_request_token(state.db(), &state.config().jwt_secret, &token).await
    {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AuthError::Database(err)) => {
            tracing::error!(error = %err, "session lookup failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            )
            .into_response()
        }
        Err(AuthError::MissingSecret) => {
            tracing::error!("JWT_SECRET is not configured; rejecting authenticated request");
            json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication failed")
                .into_response()
        }
        Err(_) => json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Authentication failed, please sign in again",
        )
        .into_response(),
    }
}
