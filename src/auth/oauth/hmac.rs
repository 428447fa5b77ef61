//! HMAC verification for install/callback requests and webhook bodies.
//!
//! All comparisons run in constant time. Request verification accepts the
//! previous API secret as a fallback so installs started before a secret
//! rotation still complete.
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::auth::oauth::hmac::{compute_signature, verify_install_request};
//! use shopify_tenant_oauth::auth::oauth::AuthParams;
//!
//! let mut params = AuthParams::from_pairs([
//!     ("shop", "test-shop.myshopify.com"),
//!     ("timestamp", "1700000000"),
//! ]);
//! let hmac = compute_signature(&params.signable_string(), "secret");
//! params.insert("hmac", hmac);
//!
//! assert!(verify_install_request(&params, "secret"));
//! assert!(!verify_install_request(&params, "other-secret"));
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::auth::oauth::AuthParams;

type HmacSha256 = Hmac<Sha256>;

fn mac_bytes(message: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Lowercase hex HMAC-SHA256 of `message`.
///
/// ```rust
/// use shopify_tenant_oauth::auth::oauth::hmac::compute_signature;
///
/// assert_eq!(
///     compute_signature("message", "key"),
///     "6e9ef29b75fffc5b7abae527d58fdadb2fe42e7219011976917343065f58ed4a"
/// );
/// ```
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn compute_signature(message: &str, secret: &str) -> String {
    hex::encode(mac_bytes(message.as_bytes(), secret.as_bytes()))
}

/// Standard base64 HMAC-SHA256 of raw bytes, as sent in
/// `X-Shopify-Hmac-SHA256`.
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn compute_signature_base64(message: &[u8], secret: &str) -> String {
    STANDARD.encode(mac_bytes(message, secret.as_bytes()))
}

/// Raw HMAC-SHA256 of `message`.
#[must_use]
#[allow(clippy::missing_panics_doc)]
pub fn compute_signature_bytes(message: &[u8], secret: &str) -> Vec<u8> {
    mac_bytes(message, secret.as_bytes())
}

/// Constant-time string equality.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn verify_params(params: &AuthParams, secret: &str) -> bool {
    let Some(received) = params.get("hmac") else {
        return false;
    };
    let computed = compute_signature(&params.signable_string(), secret);
    constant_time_compare(&computed, &received.to_ascii_lowercase())
}

/// Verifies the `hmac` of install request parameters.
///
/// Returns `false` when `hmac` is absent.
#[must_use]
pub fn verify_install_request(params: &AuthParams, secret: &str) -> bool {
    verify_params(params, secret)
}

/// Verifies the `hmac` of OAuth callback parameters.
///
/// Returns `false` when `hmac` is absent.
#[must_use]
pub fn verify_callback_request(params: &AuthParams, secret: &str) -> bool {
    verify_params(params, secret)
}

/// Verifies against the primary secret, then the previous one if given.
#[must_use]
pub fn verify_with_secrets(params: &AuthParams, primary: &str, previous: Option<&str>) -> bool {
    if verify_params(params, primary) {
        return true;
    }
    previous.is_some_and(|old| verify_params(params, old))
}

/// Verifies a webhook body against its `X-Shopify-Hmac-SHA256` header.
#[must_use]
pub fn verify_webhook_hmac(body: &[u8], header: &str, secret: &str) -> bool {
    let computed = compute_signature_base64(body, secret);
    constant_time_compare(&computed, header.trim())
}
