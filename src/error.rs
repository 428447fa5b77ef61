//! Configuration errors.
//!
//! Every validated config value and [`AppConfig::from_env`] return
//! `Result<T, ConfigError>`; the binary refuses to start on any of them.
//!
//! [`AppConfig::from_env`]: crate::AppConfig::from_env
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::{ApiKey, ConfigError};
//!
//! let result = ApiKey::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyApiKey)));
//! ```

use thiserror::Error;

/// Why configuration could not be built or loaded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `SHOPIFY_API_KEY` is empty.
    #[error("Shopify API key must not be empty")]
    EmptyApiKey,

    /// `SHOPIFY_API_SECRET` (or the previous secret) is empty.
    #[error("Shopify API secret must not be empty")]
    EmptyApiSecretKey,

    /// Tenant identifier is invalid.
    #[error("Invalid tenant id '{tenant_id}': {reason}")]
    InvalidTenantId {
        /// The rejected tenant identifier.
        tenant_id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Unknown or unsupported Admin API version.
    #[error("Unsupported API version '{version}', expected a supported 'YYYY-MM' release")]
    InvalidApiVersion {
        /// The rejected version string.
        version: String,
    },

    #[error("Invalid scopes: {reason}")]
    InvalidScopes {
        /// What is wrong with the scope list.
        reason: String,
    },

    /// A required builder field or environment variable is unset.
    #[error("Missing required setting '{field}'; it must be set before the service can start")]
    MissingRequiredField {
        /// Builder field or variable name.
        field: &'static str,
    },

    /// `APP_HOST_URL` or `SHOPIFY_API_HOST` is not an absolute URL.
    #[error("Invalid host URL '{url}', expected an absolute URL such as 'https://connector.example.com'")]
    InvalidHostUrl {
        /// The rejected URL.
        url: String,
    },

    /// Organization URL template does not contain the `{tenant}` placeholder.
    #[error("Organization URL template '{template}' must contain the '{{tenant}}' placeholder.")]
    InvalidOrganizationUrlTemplate {
        /// The template that was provided.
        template: String,
    },

    /// An environment variable is present but cannot be parsed.
    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnvVar {
        /// Variable name.
        name: &'static str,
        /// Parse failure description.
        reason: String,
    },
}
