//! Shopify OAuth for many tenants.
//!
//! The authorization code grant, split into:
//!
//! - [`params`](AuthParams): merged request parameters and the typed
//!   [`InstallRequest`] / [`CallbackRequest`] schemas
//! - [`hmac`]: request and webhook signature checks
//! - [`OAuthState`]: the signed `state` carrying tenant and nonce
//! - [`NonceManager`]: single-use nonces stored in the shop's tenant actor
//! - [`AccessTokenService`]: code exchange and token storage
//! - [`OAuthFlow`]: the install/callback state machine on top of them
//!
//! # Security
//!
//! - Install and callback parameters must carry a valid `hmac` under the
//!   current or previous API secret.
//! - The `state` is signed, so a callback cannot swap in another tenant.
//! - Each nonce is consumed at most once, and expires after the configured
//!   TTL.
//!
//! # Example
//!
//! ```rust,ignore
//! use shopify_tenant_oauth::auth::oauth::{AuthParams, InstallOutcome, OAuthFlow};
//! use shopify_tenant_oauth::{AppConfig, TenantId};
//!
//! let flow = OAuthFlow::from_config(AppConfig::from_env()?)?;
//! let tenant = TenantId::new("acme")?;
//! let params = AuthParams::from_pairs(query_pairs);
//!
//! match flow.handle_install(&tenant, &params).await? {
//!     InstallOutcome::Redirect { url } => { /* 302 to url */ }
//!     InstallOutcome::EmbeddedEscape { html, .. } => { /* 200 text/html */ }
//!     InstallOutcome::AlreadyConnected { url } => { /* 302 to tenant app */ }
//! }
//! ```

mod access_token;
mod authorize;
mod error;
mod flow;
pub mod hmac;
mod nonce;
mod params;
mod state;

pub use access_token::{
    AccessTokenError, AccessTokenService, StoredAccessToken, TokenGrant, ACCESS_TOKEN_PATH,
};
pub use authorize::{build_authorize_url, embedded_escape_html, AUTHORIZE_PATH};
pub use error::{ErrorKind, OAuthError};
pub use flow::{
    CallbackOutcome, ConnectionStatus, DisconnectOutcome, FlowStage, InstallOutcome, OAuthFlow,
};
pub use hmac::{
    compute_signature, constant_time_compare, verify_callback_request, verify_install_request,
    verify_webhook_hmac,
};
pub use nonce::{Nonce, NonceError, NonceManager, NonceStatus};
pub use params::{AuthParams, CallbackRequest, InstallRequest};
pub use state::OAuthState;
