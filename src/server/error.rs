use axum::Json;
use axum::http::{StatusCode, header::WWW_AUTHENTICATE};
use axum::response::{IntoResponse, Response};

use super::traits::StoreError;
use crate::identity::IdentityError;
use crate::protocol::ErrorDetail;

/// Message returned when a custom token is presented where an ID token is required.
pub const CUSTOM_TOKEN_MESSAGE: &str = "verify_id_token() expects an ID token, but was given a \
     custom token. Exchange the custom token for an ID token with the identity provider \
     (signInWithCustomToken) and send that ID token instead.";

/// Failures of the token exchange and the authenticated endpoints.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExchangeError {
    /// A custom token was presented as a backend credential.
    #[error("{}", CUSTOM_TOKEN_MESSAGE)]
    TokenType,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid authentication credentials: {0}")]
    InvalidToken(String),

    /// Verified identity without a backend account.
    #[error("User not found")]
    UserUnknown,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Inactive user")]
    Inactive,

    #[error("{0}")]
    Validation(String),

    /// Duplicate account data, or a request the current account state forbids.
    #[error("{0}")]
    Conflict(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Account store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExchangeError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TokenType | Self::TokenExpired | Self::InvalidToken(_) | Self::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::UserUnknown => StatusCode::NOT_FOUND,
            Self::Inactive | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                "Internal error".to_owned()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorDetail { detail });
        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<StoreError> for ExchangeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => {
                Self::Conflict(format!("User with this {field} already exists"))
            }
            StoreError::NotFound => Self::UserUnknown,
            StoreError::Backend(e) => Self::Store(e.to_string()),
        }
    }
}

impl From<IdentityError> for ExchangeError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::EmailExists => {
                Self::Conflict("User with this email already exists".into())
            }
            IdentityError::InvalidCredentials => {
                Self::Validation("Identity provider rejected the credentials".into())
            }
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<crate::error::Error> for ExchangeError {
    fn from(e: crate::error::Error) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ExchangeError::TokenType.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ExchangeError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ExchangeError::UserUnknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ExchangeError::Validation("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ExchangeError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ExchangeError::Store("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn custom_token_message_names_the_mistake() {
        let msg = ExchangeError::TokenType.to_string();
        assert!(msg.contains("expects an ID token"));
        assert!(msg.contains("custom token"));
    }

    #[test]
    fn duplicates_become_conflicts() {
        let err: ExchangeError = StoreError::Duplicate("phone number").into();
        assert_eq!(err.to_string(), "User with this phone number already exists");
    }

    #[tokio::test]
    async fn internal_errors_hide_detail() {
        let response = ExchangeError::Store("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let detail: ErrorDetail = serde_json::from_slice(&body).unwrap();
        assert_eq!(detail.detail, "Internal error");
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = ExchangeError::TokenExpired.into_response();
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }
}
