//! Webhook error types.
//!
//! Registration failures ([`WebhookError::Rejected`], [`WebhookError::Network`])
//! are recovered by the OAuth flow with a log line. Verification failures
//! reject the inbound webhook.

use crate::config::ShopDomainError;
use thiserror::Error;

/// Errors from registering or verifying webhooks.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Shopify refused the registration.
    #[error("Webhook registration rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The registration request never produced a response.
    #[error("Webhook registration request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// A required webhook header was absent.
    #[error("Missing webhook header: {header}")]
    MissingHeader {
        /// Header name.
        header: &'static str,
    },

    /// The shop domain header is not a valid shop domain.
    #[error(transparent)]
    InvalidShopDomain(#[from] ShopDomainError),

    /// The body signature did not match.
    #[error("Webhook signature verification failed")]
    InvalidHmac,
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookError>();
};
