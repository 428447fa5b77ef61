//! Application configuration.
//!
//! # Overview
//!
//! - [`AppConfig`]: every setting the connector needs, validated up front
//! - [`AppConfigBuilder`]: builder for [`AppConfig`], used directly by tests
//! - [`AppConfig::from_env`]: loads the same settings from the environment
//! - [`EnvironmentConfig`]: URL collaborator consumed by the OAuth flow
//! - Validated newtypes: [`ApiKey`], [`ApiSecretKey`], [`ShopDomain`],
//!   [`TenantId`], [`HostUrl`], [`ApiVersion`]
//!
//! # Example
//!
//! ```rust
//! use shopify_tenant_oauth::{AppConfig, ApiKey, ApiSecretKey, HostUrl};
//!
//! let config = AppConfig::builder()
//!     .api_key(ApiKey::new("my-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("my-secret").unwrap())
//!     .scopes("read_products,write_orders".parse().unwrap())
//!     .host(HostUrl::new("https://connector.example.com").unwrap())
//!     .organization_url_template("https://{tenant}.example.com/app")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.nonce_ttl().as_secs(), 600);
//! ```

mod newtypes;
mod version;

pub use newtypes::{
    ApiKey, ApiSecretKey, HostUrl, ShopDomain, ShopDomainError, ShopDomainReason, TenantId,
};
pub use version::ApiVersion;

use crate::auth::AuthScopes;
use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Path of the OAuth callback route, relative to the host URL.
pub const CALLBACK_PATH: &str = "/shopify/callback";

/// Path of the app-uninstalled webhook route, relative to the host URL.
pub const UNINSTALL_WEBHOOK_PATH: &str = "/webhooks/app-uninstalled";

const TENANT_PLACEHOLDER: &str = "{tenant}";

/// Where tenant databases live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TenantStorage {
    /// One SQLite file per shop inside this directory.
    Directory(PathBuf),
    /// Private in-memory database per shop actor. Lost on restart.
    InMemory,
}

impl Default for TenantStorage {
    fn default() -> Self {
        Self::Directory(PathBuf::from("./data/tenants"))
    }
}

impl FromStr for TenantStorage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ConfigError::InvalidEnvVar {
                name: "TENANT_DATA_DIR",
                reason: "must not be empty".to_string(),
            }),
            ":memory:" => Ok(Self::InMemory),
            dir => Ok(Self::Directory(PathBuf::from(dir))),
        }
    }
}

/// Configuration for the connector.
///
/// # Key Rotation
///
/// `old_api_secret_key` lets in-flight installs signed with the previous
/// secret still pass HMAC verification while a new secret rolls out.
#[derive(Clone, Debug)]
pub struct AppConfig {
    api_key: ApiKey,
    api_secret_key: ApiSecretKey,
    old_api_secret_key: Option<ApiSecretKey>,
    scopes: AuthScopes,
    host: HostUrl,
    organization_url_template: String,
    api_version: ApiVersion,
    api_host: Option<HostUrl>,
    tenant_storage: TenantStorage,
    nonce_ttl: Duration,
    sweep_interval: Duration,
    http_timeout: Duration,
    online_tokens: bool,
    verify_webhook_hmac: bool,
    bind_addr: SocketAddr,
}

impl AppConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::new()
    }

    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] naming the missing
    /// variable, or the validation error of the first malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingRequiredField { field: name })
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder()
            .api_key(ApiKey::new(required("SHOPIFY_API_KEY")?)?)
            .api_secret_key(ApiSecretKey::new(required("SHOPIFY_API_SECRET")?)?)
            .scopes(required("SHOPIFY_SCOPES")?.parse()?)
            .host(HostUrl::new(required("APP_HOST_URL")?)?)
            .organization_url_template(required("ORGANIZATION_URL_TEMPLATE")?);

        if let Some(old) = optional("SHOPIFY_OLD_API_SECRET") {
            builder = builder.old_api_secret_key(ApiSecretKey::new(old)?);
        }
        if let Some(version) = optional("SHOPIFY_API_VERSION") {
            builder = builder.api_version(version.parse()?);
        }
        if let Some(api_host) = optional("SHOPIFY_API_HOST") {
            builder = builder.api_host(HostUrl::new(api_host)?);
        }
        if let Some(dir) = optional("TENANT_DATA_DIR") {
            builder = builder.tenant_storage(dir.parse()?);
        }
        if let Some(secs) = optional("NONCE_TTL_SECS") {
            builder = builder.nonce_ttl(Duration::from_secs(parse_var("NONCE_TTL_SECS", &secs)?));
        }
        if let Some(secs) = optional("NONCE_SWEEP_INTERVAL_SECS") {
            builder = builder.sweep_interval(Duration::from_secs(parse_var(
                "NONCE_SWEEP_INTERVAL_SECS",
                &secs,
            )?));
        }
        if let Some(secs) = optional("HTTP_TIMEOUT_SECS") {
            builder =
                builder.http_timeout(Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", &secs)?));
        }
        if let Some(flag) = optional("ONLINE_TOKENS") {
            builder = builder.online_tokens(parse_bool("ONLINE_TOKENS", &flag)?);
        }
        if let Some(flag) = optional("VERIFY_WEBHOOK_HMAC") {
            builder = builder.verify_webhook_hmac(parse_bool("VERIFY_WEBHOOK_HMAC", &flag)?);
        }
        if let Some(addr) = optional("BIND_ADDR") {
            builder = builder.bind_addr(parse_var("BIND_ADDR", &addr)?);
        }

        builder.build()
    }

    /// Returns the API key (OAuth `client_id`).
    #[must_use]
    pub const fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API secret key (OAuth `client_secret`).
    #[must_use]
    pub const fn api_secret_key(&self) -> &ApiSecretKey {
        &self.api_secret_key
    }

    /// Returns the previous API secret key, if configured.
    #[must_use]
    pub const fn old_api_secret_key(&self) -> Option<&ApiSecretKey> {
        self.old_api_secret_key.as_ref()
    }

    /// Returns the scopes requested during install.
    #[must_use]
    pub const fn scopes(&self) -> &AuthScopes {
        &self.scopes
    }

    /// Returns the public URL of this service.
    #[must_use]
    pub const fn host(&self) -> &HostUrl {
        &self.host
    }

    /// Returns the tenant app URL template.
    #[must_use]
    pub fn organization_url_template(&self) -> &str {
        &self.organization_url_template
    }

    /// Returns the Admin API version used for webhook registration.
    #[must_use]
    pub const fn api_version(&self) -> &ApiVersion {
        &self.api_version
    }

    /// Returns the provider host override, if configured.
    #[must_use]
    pub const fn api_host(&self) -> Option<&HostUrl> {
        self.api_host.as_ref()
    }

    /// Returns where tenant databases are kept.
    #[must_use]
    pub const fn tenant_storage(&self) -> &TenantStorage {
        &self.tenant_storage
    }

    /// Returns how long an issued nonce stays valid.
    #[must_use]
    pub const fn nonce_ttl(&self) -> Duration {
        self.nonce_ttl
    }

    /// Returns the expired-nonce sweep period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Returns the upper bound for each provider HTTP call.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Returns whether per-user (online) tokens are requested.
    #[must_use]
    pub const fn online_tokens(&self) -> bool {
        self.online_tokens
    }

    /// Returns whether uninstall webhooks must carry a valid HMAC.
    #[must_use]
    pub const fn verify_webhook_hmac(&self) -> bool {
        self.verify_webhook_hmac
    }

    /// Returns the server listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Base URL for provider calls against `shop`.
    ///
    /// Uses the `api_host` override when set, otherwise `https://{shop}`.
    #[must_use]
    pub fn shop_base_url(&self, shop: &ShopDomain) -> String {
        self.api_host
            .as_ref()
            .map_or_else(|| format!("https://{shop}"), |host| host.as_ref().to_string())
    }
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AppConfig>();
};

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar {
            name,
            reason: e.to_string(),
        })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// Builder for [`AppConfig`].
///
/// Required: `api_key`, `api_secret_key`, `host`, `organization_url_template`.
///
/// # Defaults
///
/// - `scopes`: empty
/// - `api_version`: latest stable
/// - `tenant_storage`: `./data/tenants`
/// - `nonce_ttl`: 10 minutes
/// - `sweep_interval`: 1 hour
/// - `http_timeout`: 10 seconds
/// - `online_tokens`: `false`
/// - `verify_webhook_hmac`: `true`
/// - `bind_addr`: `0.0.0.0:8080`
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    api_key: Option<ApiKey>,
    api_secret_key: Option<ApiSecretKey>,
    old_api_secret_key: Option<ApiSecretKey>,
    scopes: Option<AuthScopes>,
    host: Option<HostUrl>,
    organization_url_template: Option<String>,
    api_version: Option<ApiVersion>,
    api_host: Option<HostUrl>,
    tenant_storage: Option<TenantStorage>,
    nonce_ttl: Option<Duration>,
    sweep_interval: Option<Duration>,
    http_timeout: Option<Duration>,
    online_tokens: Option<bool>,
    verify_webhook_hmac: Option<bool>,
    bind_addr: Option<SocketAddr>,
}

impl AppConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the API secret key (required).
    #[must_use]
    pub fn api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.api_secret_key = Some(key);
        self
    }

    /// Sets the previous API secret key accepted during rotation.
    #[must_use]
    pub fn old_api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.old_api_secret_key = Some(key);
        self
    }

    /// Sets the scopes requested during install.
    #[must_use]
    pub fn scopes(mut self, scopes: AuthScopes) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Sets the public URL of this service (required).
    #[must_use]
    pub fn host(mut self, host: HostUrl) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the tenant app URL template; must contain `{tenant}` (required).
    #[must_use]
    pub fn organization_url_template(mut self, template: impl Into<String>) -> Self {
        self.organization_url_template = Some(template.into());
        self
    }

    /// Sets the Admin API version.
    #[must_use]
    pub fn api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = Some(version);
        self
    }

    /// Routes every provider call to this host instead of the shop domain.
    #[must_use]
    pub fn api_host(mut self, host: HostUrl) -> Self {
        self.api_host = Some(host);
        self
    }

    /// Sets where tenant databases are kept.
    #[must_use]
    pub fn tenant_storage(mut self, storage: TenantStorage) -> Self {
        self.tenant_storage = Some(storage);
        self
    }

    /// Sets the nonce lifetime.
    #[must_use]
    pub const fn nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = Some(ttl);
        self
    }

    /// Sets the expired-nonce sweep period.
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub const fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Requests per-user tokens (`grant_options[]=per-user`).
    #[must_use]
    pub const fn online_tokens(mut self, online: bool) -> Self {
        self.online_tokens = Some(online);
        self
    }

    /// Enables or disables uninstall webhook HMAC verification.
    #[must_use]
    pub const fn verify_webhook_hmac(mut self, verify: bool) -> Self {
        self.verify_webhook_hmac = Some(verify);
        self
    }

    /// Sets the server listen address.
    #[must_use]
    pub const fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Builds the [`AppConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if a required field is
    /// unset, or [`ConfigError::InvalidOrganizationUrlTemplate`] if the
    /// template lacks `{tenant}`.
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let api_key = self
            .api_key
            .ok_or(ConfigError::MissingRequiredField { field: "api_key" })?;
        let api_secret_key = self
            .api_secret_key
            .ok_or(ConfigError::MissingRequiredField {
                field: "api_secret_key",
            })?;
        let host = self
            .host
            .ok_or(ConfigError::MissingRequiredField { field: "host" })?;
        let organization_url_template =
            self.organization_url_template
                .ok_or(ConfigError::MissingRequiredField {
                    field: "organization_url_template",
                })?;
        if !organization_url_template.contains(TENANT_PLACEHOLDER) {
            return Err(ConfigError::InvalidOrganizationUrlTemplate {
                template: organization_url_template,
            });
        }

        Ok(AppConfig {
            api_key,
            api_secret_key,
            old_api_secret_key: self.old_api_secret_key,
            scopes: self.scopes.unwrap_or_default(),
            host,
            organization_url_template,
            api_version: self.api_version.unwrap_or_default(),
            api_host: self.api_host,
            tenant_storage: self.tenant_storage.unwrap_or_default(),
            nonce_ttl: self.nonce_ttl.unwrap_or(Duration::from_secs(600)),
            sweep_interval: self.sweep_interval.unwrap_or(Duration::from_secs(3600)),
            http_timeout: self.http_timeout.unwrap_or(Duration::from_secs(10)),
            online_tokens: self.online_tokens.unwrap_or(false),
            verify_webhook_hmac: self.verify_webhook_hmac.unwrap_or(true),
            bind_addr: self
                .bind_addr
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
        })
    }
}

/// URLs the OAuth flow needs from its deployment environment.
pub trait EnvironmentConfig: Send + Sync {
    /// Where a tenant lands after a successful (or redundant) install.
    fn organization_url(&self, tenant: &TenantId) -> String;

    /// Absolute `redirect_uri` for the authorize step.
    fn oauth_callback_url(&self) -> String;

    /// Absolute URL for a webhook route on this service.
    fn webhook_url(&self, path: &str) -> String;
}

/// [`EnvironmentConfig`] backed by fixed values from [`AppConfig`].
///
/// ```rust
/// use shopify_tenant_oauth::{EnvironmentConfig, HostUrl, StaticEnvironment, TenantId};
///
/// let env = StaticEnvironment::new(
///     HostUrl::new("https://connector.example.com").unwrap(),
///     "https://app.example.com/orgs/{tenant}",
/// );
/// let tenant = TenantId::new("acme").unwrap();
/// assert_eq!(env.organization_url(&tenant), "https://app.example.com/orgs/acme");
/// assert_eq!(env.oauth_callback_url(), "https://connector.example.com/shopify/callback");
/// ```
#[derive(Clone, Debug)]
pub struct StaticEnvironment {
    host: HostUrl,
    organization_url_template: String,
}

impl StaticEnvironment {
    /// Creates an environment from a host and a `{tenant}` template.
    #[must_use]
    pub fn new(host: HostUrl, organization_url_template: impl Into<String>) -> Self {
        Self {
            host,
            organization_url_template: organization_url_template.into(),
        }
    }

    /// Creates an environment from application config.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.host().clone(), config.organization_url_template())
    }
}

impl EnvironmentConfig for StaticEnvironment {
    fn organization_url(&self, tenant: &TenantId) -> String {
        self.organization_url_template
            .replace(TENANT_PLACEHOLDER, tenant.as_ref())
    }

    fn oauth_callback_url(&self) -> String {
        self.host.join(CALLBACK_PATH)
    }

    fn webhook_url(&self, path: &str) -> String {
        self.host.join(path)
    }
}
