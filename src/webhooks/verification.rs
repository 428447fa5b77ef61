//! Inbound webhook verification.
//!
//! A webhook is accepted when its `X-Shopify-Shop-Domain` header names a
//! valid shop and, if verification is enabled, its body HMAC matches the
//! current or previous API secret.
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::auth::oauth::hmac::compute_signature_base64;
//! use shopify_tenant_oauth::webhooks::{verify_webhook, WebhookRequest};
//!
//! let body = br#"{"id":1}"#.to_vec();
//! let request = WebhookRequest::new(body.clone())
//!     .hmac_header(compute_signature_base64(&body, "secret"))
//!     .shop_domain("acme.myshopify.com")
//!     .topic("app/uninstalled");
//!
//! let context = verify_webhook(&request, "secret", None, true).unwrap();
//! assert_eq!(context.shop().as_ref(), "acme.myshopify.com");
//! assert_eq!(context.topic(), Some("app/uninstalled"));
//! ```

use crate::auth::oauth::hmac::verify_webhook_hmac;
use crate::config::ShopDomain;
use crate::webhooks::WebhookError;

/// Header carrying the base64 body HMAC.
pub const HEADER_HMAC: &str = "X-Shopify-Hmac-SHA256";

/// Header carrying the webhook topic.
pub const HEADER_TOPIC: &str = "X-Shopify-Topic";

/// Header carrying the originating shop domain.
pub const HEADER_SHOP_DOMAIN: &str = "X-Shopify-Shop-Domain";

/// Header carrying the API version of the payload.
pub const HEADER_API_VERSION: &str = "X-Shopify-API-Version";

/// Header carrying the delivery id.
pub const HEADER_WEBHOOK_ID: &str = "X-Shopify-Webhook-Id";

/// Raw parts of an inbound webhook.
#[derive(Clone, Debug, Default)]
pub struct WebhookRequest {
    body: Vec<u8>,
    hmac_header: Option<String>,
    topic: Option<String>,
    shop_domain: Option<String>,
    api_version: Option<String>,
    webhook_id: Option<String>,
}

impl WebhookRequest {
    /// Creates a request with `body` and no headers.
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Sets the HMAC header value.
    #[must_use]
    pub fn hmac_header(mut self, value: impl Into<String>) -> Self {
        self.hmac_header = Some(value.into());
        self
    }

    /// Sets the topic header value.
    #[must_use]
    pub fn topic(mut self, value: impl Into<String>) -> Self {
        self.topic = Some(value.into());
        self
    }

    /// Sets the shop domain header value.
    #[must_use]
    pub fn shop_domain(mut self, value: impl Into<String>) -> Self {
        self.shop_domain = Some(value.into());
        self
    }

    /// Sets the API version header value.
    #[must_use]
    pub fn api_version(mut self, value: impl Into<String>) -> Self {
        self.api_version = Some(value.into());
        self
    }

    /// Sets the webhook id header value.
    #[must_use]
    pub fn webhook_id(mut self, value: impl Into<String>) -> Self {
        self.webhook_id = Some(value.into());
        self
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Metadata of a verified webhook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookContext {
    shop: ShopDomain,
    topic: Option<String>,
    api_version: Option<String>,
    webhook_id: Option<String>,
}

impl WebhookContext {
    /// The originating shop.
    #[must_use]
    pub const fn shop(&self) -> &ShopDomain {
        &self.shop
    }

    /// The topic, as sent.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The payload API version, as sent.
    #[must_use]
    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// The delivery id, as sent.
    #[must_use]
    pub fn webhook_id(&self) -> Option<&str> {
        self.webhook_id.as_deref()
    }
}

/// Validates the shop header, then the body HMAC when `verify_hmac` is set.
///
/// # Errors
///
/// - [`WebhookError::MissingHeader`] if the shop domain header is absent,
///   or the HMAC header is absent while verification is enabled
/// - [`WebhookError::InvalidShopDomain`] if the shop header is invalid
/// - [`WebhookError::InvalidHmac`] if neither secret matches
pub fn verify_webhook(
    request: &WebhookRequest,
    secret: &str,
    previous_secret: Option<&str>,
    verify_hmac: bool,
) -> Result<WebhookContext, WebhookError> {
    let raw_shop = request
        .shop_domain
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(WebhookError::MissingHeader {
            header: HEADER_SHOP_DOMAIN,
        })?;
    let shop = ShopDomain::new(raw_shop.trim())?;

    if verify_hmac {
        let header = request
            .hmac_header
            .as_deref()
            .ok_or(WebhookError::MissingHeader {
                header: HEADER_HMAC,
            })?;
        let verified = verify_webhook_hmac(&request.body, header, secret)
            || previous_secret.is_some_and(|old| verify_webhook_hmac(&request.body, header, old));
        if !verified {
            return Err(WebhookError::InvalidHmac);
        }
    }

    Ok(WebhookContext {
        shop,
        topic: request.topic.clone(),
        api_version: request.api_version.clone(),
        webhook_id: request.webhook_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::hmac::compute_signature_base64;

    const BODY: &[u8] = br#"{"id":123,"domain":"acme.myshopify.com"}"#;

    fn signed(secret: &str) -> WebhookRequest {
        WebhookRequest::new(BODY.to_vec())
            .hmac_header(compute_signature_base64(BODY, secret))
            .shop_domain("acme.myshopify.com")
            .topic("app/uninstalled")
            .api_version("2026-07")
            .webhook_id("wh-1")
    }

    #[test]
    fn test_header_constants_match_shopify_documentation() {
        assert_eq!(HEADER_HMAC, "X-Shopify-Hmac-SHA256");
        assert_eq!(HEADER_TOPIC, "X-Shopify-Topic");
        assert_eq!(HEADER_SHOP_DOMAIN, "X-Shopify-Shop-Domain");
        assert_eq!(HEADER_API_VERSION, "X-Shopify-API-Version");
        assert_eq!(HEADER_WEBHOOK_ID, "X-Shopify-Webhook-Id");
    }

    #[test]
    fn test_valid_webhook_yields_context() {
        let context = verify_webhook(&signed("secret"), "secret", None, true).unwrap();
        assert_eq!(context.shop().as_ref(), "acme.myshopify.com");
        assert_eq!(context.topic(), Some("app/uninstalled"));
        assert_eq!(context.api_version(), Some("2026-07"));
        assert_eq!(context.webhook_id(), Some("wh-1"));
    }

    #[test]
    fn test_wrong_secret_fails_unless_previous_matches() {
        let request = signed("old");
        assert!(matches!(
            verify_webhook(&request, "new", None, true),
            Err(WebhookError::InvalidHmac)
        ));
        assert!(verify_webhook(&request, "new", Some("old"), true).is_ok());
    }

    #[test]
    fn test_missing_shop_header_is_rejected_first() {
        let request = WebhookRequest::new(BODY.to_vec());
        let err = verify_webhook(&request, "secret", None, true).unwrap_err();
        assert!(matches!(
            err,
            WebhookError::MissingHeader { header } if header == HEADER_SHOP_DOMAIN
        ));
    }

    #[test]
    fn test_invalid_shop_header_is_rejected() {
        let request = WebhookRequest::new(BODY.to_vec()).shop_domain("evil.example.com");
        assert!(matches!(
            verify_webhook(&request, "secret", None, false),
            Err(WebhookError::InvalidShopDomain(_))
        ));
    }

    #[test]
    fn test_verification_can_be_disabled() {
        let request = WebhookRequest::new(BODY.to_vec()).shop_domain("acme.myshopify.com");
        assert!(verify_webhook(&request, "secret", None, false).is_ok());
        assert!(matches!(
            verify_webhook(&request, "secret", None, true),
            Err(WebhookError::MissingHeader { .. })
        ));
    }
}
