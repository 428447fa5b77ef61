//! Authentication: OAuth scopes and the install/callback flow.
//!
//! - [`AuthScopes`]: the comma-separated scope list requested at install
//! - [`oauth`]: HMAC checks, nonces, state, token exchange and the flow

pub mod oauth;
mod scopes;

pub use scopes::AuthScopes;
