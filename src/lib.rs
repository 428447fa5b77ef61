//! # Shopify tenant OAuth
//!
//! A multi-tenant Shopify OAuth connector: each tenant of a platform
//! connects its Shopify shop once, and the platform keeps one access token
//! per shop to act on the tenant's behalf.
//!
//! ## Overview
//!
//! - Validated newtypes for credentials, shop domains and tenant ids
//! - Install and callback HMAC verification with secret rotation
//! - Signed `state` carrying the tenant id and a single-use nonce
//! - One serialized actor per shop owning an embedded `SQLite` database
//!   ([`tenant`]), migrated on cold start
//! - Code-for-token exchange, storage and uninstall webhook registration
//! - An axum router exposing the whole flow ([`server`])
//!
//! ## Quick Start
//!
//! ```rust
//! use shopify_tenant_oauth::{ApiKey, ApiSecretKey, AppConfig, HostUrl, TenantStorage};
//!
//! let config = AppConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("your-api-secret").unwrap())
//!     .scopes("read_products,write_orders".parse().unwrap())
//!     .host(HostUrl::new("https://connector.example.com").unwrap())
//!     .organization_url_template("https://app.example.com/orgs/{tenant}")
//!     .tenant_storage(TenantStorage::InMemory)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.nonce_ttl().as_secs(), 600);
//! ```
//!
//! ## Serving
//!
//! ```rust,ignore
//! use shopify_tenant_oauth::auth::oauth::OAuthFlow;
//! use shopify_tenant_oauth::server::{router, AppState};
//! use shopify_tenant_oauth::AppConfig;
//!
//! let flow = OAuthFlow::from_config(AppConfig::from_env()?)?;
//! let app = router(AppState::new(flow));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod tenant;
pub mod webhooks;

pub use auth::AuthScopes;
pub use config::{
    ApiKey, ApiSecretKey, ApiVersion, AppConfig, AppConfigBuilder, EnvironmentConfig, HostUrl,
    ShopDomain, ShopDomainError, ShopDomainReason, StaticEnvironment, TenantId, TenantStorage,
};
pub use error::ConfigError;

pub use auth::oauth::{
    AccessTokenError, AccessTokenService, ErrorKind, InstallOutcome, Nonce, NonceError,
    NonceManager, OAuthError, OAuthFlow, OAuthState,
};
pub use tenant::{NonceSweeper, StorageError, TenantRegistry};
