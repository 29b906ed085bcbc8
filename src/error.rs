use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{
    auth::{jwt::TokenError, password::PasswordError},
    users::StoreError,
};

/// Errors surfaced by the authentication flow and the authorization gate.
///
/// Client-facing messages are stable; storage, hashing and token-signing
/// failures are logged and replaced by a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("an account with this email already exists")]
    AlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is deactivated")]
    AccountDeactivated,
    #[error("authentication required")]
    Unauthenticated,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Hashing(#[from] PasswordError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "INVALID_INPUT",
            AuthError::AlreadyExists => "ALREADY_EXISTS",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::NotFound => "NOT_FOUND",
            AuthError::Storage(StoreError::Timeout) => "TIMEOUT",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::Hashing(_) => "CONFIG_ERROR",
            AuthError::Token(_) | AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::AlreadyExists => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Storage(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AuthError::Storage(_)
            | AuthError::Hashing(_)
            | AuthError::Token(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            AuthError::Storage(StoreError::Timeout) => "The request timed out".to_string(),
            AuthError::Storage(_)
            | AuthError::Hashing(_)
            | AuthError::Token(_)
            | AuthError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

// Body and path rejections carry serde/uuid detail; clients only get a fixed message.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "rejected request body");
        let msg = match rejection {
            JsonRejection::JsonDataError(_) => "Request body is missing fields or has invalid values",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => "Expected Content-Type: application/json",
            _ => "Invalid request body",
        };
        AuthError::InvalidInput(msg.into())
    }
}

impl From<PathRejection> for AuthError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "rejected path parameter");
        AuthError::InvalidInput("Invalid user id".into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "request failed");
        }
        let body = json!({
            "error": self.client_message(),
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}
