//! HTTP error responses.

use crate::auth::oauth::OAuthError;
use crate::webhooks::WebhookError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Any error a handler can return.
#[derive(Debug, Error)]
pub enum AppError {
    /// Install, callback, status or disconnect failure.
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// Webhook verification failure.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Malformed request outside the OAuth parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OAuth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Webhook(WebhookError::MissingHeader { .. } | WebhookError::InvalidShopDomain(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Webhook(WebhookError::InvalidHmac) => StatusCode::UNAUTHORIZED,
            Self::Webhook(WebhookError::Rejected { .. } | WebhookError::Network(_)) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Error kind reported in the JSON body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OAuth(e) => e.kind().as_str(),
            Self::Webhook(WebhookError::InvalidShopDomain(_)) => "InvalidShopDomainError",
            Self::Webhook(WebhookError::InvalidHmac) => "InvalidHmacError",
            Self::Webhook(_) => "WebhookError",
            Self::BadRequest(_) => "OAuthError",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        // Internal details stay in the logs.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorBody {
                error,
                kind: self.kind(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::AccessTokenError;
    use crate::config::ShopDomain;
    use crate::tenant::StorageError;

    fn status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_oauth_errors_map_to_their_status() {
        assert_eq!(status(OAuthError::InvalidHmac), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(OAuthError::InvalidNonce {
                reason: "x".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(OAuthError::AccessToken(AccessTokenError::MalformedResponse {
                reason: "x".to_string()
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(OAuthError::Timeout {
                operation: "token exchange"
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_webhook_errors_map_to_their_status() {
        assert_eq!(status(WebhookError::InvalidHmac), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(WebhookError::from(ShopDomain::new("x").unwrap_err())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(WebhookError::MissingHeader { header: "h" }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_kind_follows_error() {
        let err = AppError::from(OAuthError::InvalidHmac);
        assert_eq!(err.kind(), "InvalidHmacError");
        let err = AppError::from(OAuthError::Storage(StorageError::Unavailable {
            reason: "x".to_string(),
        }));
        assert_eq!(err.kind(), "OAuthError");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
