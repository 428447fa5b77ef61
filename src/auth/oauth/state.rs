//! The signed OAuth `state` parameter.
//!
//! The state carries the tenant id and the install nonce through Shopify's
//! authorize redirect. It is encoded as
//! `base64url(json) "." base64url(hmac_sha256(json))`, both parts without
//! padding, so tampering with either the tenant or the nonce is detected
//! before any storage lookup.
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::auth::oauth::{Nonce, OAuthState};
//! use shopify_tenant_oauth::config::TenantId;
//!
//! let state = OAuthState::new(TenantId::new("acme").unwrap(), Nonce::generate());
//! let wire = state.encode("secret");
//!
//! assert_eq!(OAuthState::decode(&wire, "secret", None).unwrap(), state);
//! assert!(OAuthState::decode(&wire, "other", None).is_err());
//! ```

use crate::auth::oauth::hmac::{compute_signature_bytes, constant_time_compare};
use crate::auth::oauth::{Nonce, OAuthError};
use crate::config::TenantId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct StatePayload {
    t: String,
    n: String,
}

/// Tenant and nonce carried through the authorize redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthState {
    tenant: TenantId,
    nonce: Nonce,
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthState>();
};

fn invalid(reason: &str) -> OAuthError {
    OAuthError::InvalidNonce {
        reason: format!("invalid state: {reason}"),
    }
}

fn signature(payload: &str, secret: &str) -> String {
    URL_SAFE_NO_PAD.encode(compute_signature_bytes(payload.as_bytes(), secret))
}

impl OAuthState {
    /// Creates a state for `tenant` bound to `nonce`.
    #[must_use]
    pub const fn new(tenant: TenantId, nonce: Nonce) -> Self {
        Self { tenant, nonce }
    }

    /// The tenant that started the install.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// The nonce issued for the install.
    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Encodes and signs the state with `secret`.
    #[must_use]
    pub fn encode(&self, secret: &str) -> String {
        let payload = StatePayload {
            t: self.tenant.to_string(),
            n: self.nonce.to_string(),
        };
        // Two string fields always serialize.
        let json = serde_json::to_string(&payload).unwrap_or_default();
        let body = URL_SAFE_NO_PAD.encode(json);
        let sig = signature(&body, secret);
        format!("{body}.{sig}")
    }

    /// Verifies and decodes a received state.
    ///
    /// The signature is checked against `secret`, then against
    /// `previous_secret` if given.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidNonce`] if the value is malformed, the
    /// signature does not match, or the tenant id or nonce is invalid.
    pub fn decode(
        raw: &str,
        secret: &str,
        previous_secret: Option<&str>,
    ) -> Result<Self, OAuthError> {
        let (body, sig) = raw.split_once('.').ok_or_else(|| invalid("missing signature"))?;

        let signed = constant_time_compare(&signature(body, secret), sig)
            || previous_secret.is_some_and(|old| constant_time_compare(&signature(body, old), sig));
        if !signed {
            return Err(invalid("signature mismatch"));
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| invalid("not base64url"))?;
        let payload: StatePayload =
            serde_json::from_slice(&json).map_err(|_| invalid("malformed payload"))?;

        let tenant = TenantId::new(payload.t).map_err(|_| invalid("bad tenant id"))?;
        let nonce = Nonce::parse(&payload.n).map_err(|_| invalid("bad nonce"))?;
        Ok(Self { tenant, nonce })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> OAuthState {
        OAuthState::new(TenantId::new("org_42").unwrap(), Nonce::generate())
    }

    #[test]
    fn test_encoded_state_is_url_safe() {
        let wire = state().encode("secret");
        assert!(wire
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
        assert_eq!(wire.matches('.').count(), 1);
    }

    #[test]
    fn test_decode_recovers_tenant_and_nonce() {
        let original = state();
        let decoded = OAuthState::decode(&original.encode("secret"), "secret", None).unwrap();
        assert_eq!(decoded.tenant().as_ref(), "org_42");
        assert_eq!(decoded.nonce(), original.nonce());
    }

    #[test]
    fn test_decode_accepts_previous_secret() {
        let wire = state().encode("old-secret");
        assert!(OAuthState::decode(&wire, "new-secret", None).is_err());
        assert!(OAuthState::decode(&wire, "new-secret", Some("old-secret")).is_ok());
    }

    #[test]
    fn test_decode_rejects_tampered_payload() {
        let wire = state().encode("secret");
        let (_, sig) = wire.split_once('.').unwrap();
        let forged_body = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"t":"evil","n":"{}"}}"#,
            Nonce::generate()
        ));
        let forged = format!("{forged_body}.{sig}");

        let err = OAuthState::decode(&forged, "secret", None).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidNonce { ref reason } if reason.contains("signature")));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for raw in ["", "no-dot", "a.b", "!!!.???"] {
            assert!(matches!(
                OAuthState::decode(raw, "secret", None),
                Err(OAuthError::InvalidNonce { .. })
            ));
        }
    }

    #[test]
    fn test_decode_rejects_signed_but_invalid_tenant() {
        let body = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"t":"bad tenant!","n":"{}"}}"#,
            Nonce::generate()
        ));
        let wire = format!("{body}.{}", signature(&body, "secret"));
        let err = OAuthState::decode(&wire, "secret", None).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidNonce { ref reason } if reason.contains("tenant")));
    }
}
