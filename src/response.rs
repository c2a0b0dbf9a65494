use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<SuccessResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// 400 for a required field that was absent or blank.
    pub fn missing_field(field: &str) -> Self {
        Self::validation(format!("{field} is required"))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            tracing::error!(code = %self.code, error = %self.message, "request failed");
            "Internal server error".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(format!("database error: {err}"))
    }
}

impl From<crate::services::llm_provider::LLMError> for AppError {
    fn from(err: crate::services::llm_provider::LLMError) -> Self {
        use crate::services::llm_provider::LLMError;
        match err {
            LLMError::NotConfigured(_) => {
                Self::service_unavailable("AI generation is not configured")
            }
            other => Self::internal(format!("LLM call failed: {other}")),
        }
    }
}

impl From<crate::services::billing::BillingError> for AppError {
    fn from(err: crate::services::billing::BillingError) -> Self {
        use crate::services::billing::BillingError;
        match err {
            BillingError::NotConfigured(_) => {
                Self::service_unavailable("Billing is not configured")
            }
            BillingError::InvalidSignature(reason) => {
                Self::bad_request(format!("Invalid webhook signature: {reason}"))
            }
            BillingError::MalformedEvent(reason) => {
                Self::bad_request(format!("Malformed webhook event: {reason}"))
            }
            BillingError::NoCustomer => Self::not_found("No billing account for this user"),
            other => Self::internal(format!("billing call failed: {other}")),
        }
    }
}

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::Expired => {
                Self::unauthorized("Authentication failed, please sign in again")
            }
            other => Self::internal(format!("auth failure: {other}")),
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> AppError {
    AppError {
        status,
        code: code.into(),
        message: message.into(),
        is_operational: true,
    }
}
