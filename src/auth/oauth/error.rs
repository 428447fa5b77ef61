//! Flow-level OAuth errors.
//!
//! [`OAuthError`] is what the install and callback handlers return. Each
//! variant maps to one of five coarse [`ErrorKind`]s and to an HTTP status,
//! so the HTTP layer never has to inspect error messages.
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::auth::oauth::{ErrorKind, OAuthError};
//!
//! let error = OAuthError::InvalidHmac;
//! assert_eq!(error.to_string(), "HMAC signature validation failed");
//! assert_eq!(error.kind(), ErrorKind::InvalidHmac);
//! assert_eq!(error.status_code(), 401);
//! ```

use crate::auth::oauth::{AccessTokenError, NonceError};
use crate::config::ShopDomainError;
use crate::tenant::StorageError;
use std::fmt;
use thiserror::Error;

/// Errors that end an install or callback attempt.
///
/// Domain, HMAC and nonce failures are terminal and never retried.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The `shop` parameter is not a valid `*.myshopify.com` domain.
    #[error(transparent)]
    InvalidShopDomain(#[from] ShopDomainError),

    /// The request `hmac` did not match under any configured secret.
    #[error("HMAC signature validation failed")]
    InvalidHmac,

    /// The state or nonce could not be verified or consumed.
    #[error("Invalid nonce: {reason}")]
    InvalidNonce {
        /// Why the nonce was rejected.
        reason: String,
    },

    /// The authorization code could not be exchanged.
    #[error(transparent)]
    AccessToken(#[from] AccessTokenError),

    /// A required parameter is missing or malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// A configuration value needed by the flow is absent.
    #[error("Missing configuration: {field}")]
    MissingConfig {
        /// Name of the missing setting.
        field: &'static str,
    },

    /// An outbound call exceeded the configured HTTP timeout.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },

    /// The tenant store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Coarse classification of [`OAuthError`], exposed to API clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad shop domain.
    InvalidShopDomain,
    /// Bad request signature.
    InvalidHmac,
    /// Bad, reused or expired nonce.
    InvalidNonce,
    /// Token exchange failure.
    AccessToken,
    /// Everything else.
    OAuth,
}

impl ErrorKind {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidShopDomain => "InvalidShopDomainError",
            Self::InvalidHmac => "InvalidHmacError",
            Self::InvalidNonce => "InvalidNonceError",
            Self::AccessToken => "AccessTokenError",
            Self::OAuth => "OAuthError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OAuthError {
    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidShopDomain(_) => ErrorKind::InvalidShopDomain,
            Self::InvalidHmac => ErrorKind::InvalidHmac,
            Self::InvalidNonce { .. } => ErrorKind::InvalidNonce,
            Self::AccessToken(_) => ErrorKind::AccessToken,
            Self::InvalidRequest { .. }
            | Self::MissingConfig { .. }
            | Self::Timeout { .. }
            | Self::Storage(_) => ErrorKind::OAuth,
        }
    }

    /// HTTP status the error is reported with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidShopDomain(_) | Self::InvalidNonce { .. } | Self::InvalidRequest { .. } => {
                400
            }
            Self::InvalidHmac => 401,
            Self::AccessToken(_) => 502,
            Self::Timeout { .. } => 504,
            Self::MissingConfig { .. } | Self::Storage(_) => 500,
        }
    }
}

impl From<NonceError> for OAuthError {
    fn from(error: NonceError) -> Self {
        match error {
            NonceError::Storage(e) => Self::Storage(e),
            other => Self::InvalidNonce {
                reason: other.to_string(),
            },
        }
    }
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthError>();
};
