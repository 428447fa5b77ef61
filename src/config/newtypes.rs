//! Validated newtype wrappers for configuration and request values.
//!
//! Each wrapper validates its contents on construction and offers no way to
//! build an instance that skipped validation.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A validated Shopify API key (the OAuth `client_id`).
///
/// # Example
///
/// ```rust
/// use shopify_tenant_oauth::ApiKey;
///
/// let key = ApiKey::new("my-api-key").unwrap();
/// assert_eq!(key.as_ref(), "my-api-key");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Creates a new validated API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiKey`] if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for ApiKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated Shopify API secret key (the OAuth `client_secret`).
///
/// The `Debug` implementation masks the value so the secret never ends up
/// in logs.
///
/// ```rust
/// use shopify_tenant_oauth::ApiSecretKey;
///
/// let secret = ApiSecretKey::new("my-secret").unwrap();
/// assert_eq!(format!("{:?}", secret), "ApiSecretKey(*****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSecretKey(String);

impl ApiSecretKey {
    /// Creates a new validated API secret key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiSecretKey`] if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyApiSecretKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for ApiSecretKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecretKey(*****)")
    }
}

/// Why a shop domain was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShopDomainReason {
    /// The value is empty or does not end with `.myshopify.com`.
    MustEndWithSuffix,
    /// The value carries a scheme, port, credentials, path, query or fragment.
    ContainsProtocolOrPath,
    /// The value contains whitespace or control whitespace.
    ContainsWhitespace,
    /// The shop name starts with `-` or `.`.
    LeadingHyphenOrDot,
    /// The shop name contains characters other than ASCII letters, digits and `-`.
    InvalidCharacterSet,
}

impl fmt::Display for ShopDomainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MustEndWithSuffix => "must end with .myshopify.com",
            Self::ContainsProtocolOrPath => "must not contain a protocol, port, path, query or fragment",
            Self::ContainsWhitespace => "must not contain whitespace",
            Self::LeadingHyphenOrDot => "must not start with a hyphen or dot",
            Self::InvalidCharacterSet => "may only contain ASCII letters, digits and hyphens",
        };
        f.write_str(text)
    }
}

/// A shop domain failed validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Invalid shop domain '{input}': {reason}")]
pub struct ShopDomainError {
    /// The rejected input, verbatim.
    pub input: String,
    /// The first rule the input violated.
    pub reason: ShopDomainReason,
}

/// A validated Shopify shop domain such as `my-store.myshopify.com`.
///
/// Unlike most domain handling, the input is kept exactly as received: a
/// mixed-case domain stays mixed-case. Use [`ShopDomain::canonical`] when a
/// case-insensitive key is needed (storage, actor routing).
///
/// ```rust
/// use shopify_tenant_oauth::ShopDomain;
///
/// let domain = ShopDomain::new("My-Store.myshopify.com").unwrap();
/// assert_eq!(domain.as_ref(), "My-Store.myshopify.com");
/// assert_eq!(domain.shop_name(), "My-Store");
/// assert_eq!(domain.canonical(), "my-store.myshopify.com");
///
/// assert!(ShopDomain::new("my-store.myshopify.com.evil.com").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShopDomain {
    full_domain: String,
    shop_name_end: usize,
}

impl ShopDomain {
    /// Required suffix, matched case-insensitively.
    pub const SUFFIX: &'static str = ".myshopify.com";

    /// Validates `domain` and wraps it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ShopDomainError`] naming the first violated rule.
    pub fn new(domain: impl Into<String>) -> Result<Self, ShopDomainError> {
        let domain = domain.into();
        match Self::check(&domain) {
            Ok(shop_name_end) => Ok(Self {
                full_domain: domain,
                shop_name_end,
            }),
            Err(reason) => Err(ShopDomainError {
                input: domain,
                reason,
            }),
        }
    }

    /// Returns the shop name portion, e.g. `my-store`.
    #[must_use]
    pub fn shop_name(&self) -> &str {
        &self.full_domain[..self.shop_name_end]
    }

    /// Lowercased form used as the storage and routing key.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.full_domain.to_ascii_lowercase()
    }

    fn check(domain: &str) -> Result<usize, ShopDomainReason> {
        if domain.is_empty() {
            return Err(ShopDomainReason::MustEndWithSuffix);
        }
        if domain.chars().any(char::is_whitespace) {
            return Err(ShopDomainReason::ContainsWhitespace);
        }
        if domain.contains(['/', '?', '#', '@', ':', '\\']) {
            return Err(ShopDomainReason::ContainsProtocolOrPath);
        }

        let split = domain
            .len()
            .checked_sub(Self::SUFFIX.len())
            .ok_or(ShopDomainReason::MustEndWithSuffix)?;
        let suffix = domain
            .get(split..)
            .ok_or(ShopDomainReason::MustEndWithSuffix)?;
        if !suffix.eq_ignore_ascii_case(Self::SUFFIX) {
            return Err(ShopDomainReason::MustEndWithSuffix);
        }

        let name = &domain[..split];
        if name.is_empty() {
            return Err(ShopDomainReason::MustEndWithSuffix);
        }
        if name.starts_with(['-', '.']) {
            return Err(ShopDomainReason::LeadingHyphenOrDot);
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ShopDomainReason::InvalidCharacterSet);
        }

        Ok(split)
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.full_domain
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_domain)
    }
}

impl FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ShopDomain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.full_domain)
    }
}

impl<'de> Deserialize<'de> for ShopDomain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

/// Identifier of a platform tenant (organization).
///
/// Restricted to ASCII letters, digits, `-` and `_` so it can be embedded in
/// URLs and in the OAuth `state` without escaping ambiguity.
///
/// ```rust
/// use shopify_tenant_oauth::TenantId;
///
/// assert!(TenantId::new("org_42").is_ok());
/// assert!(TenantId::new("org 42").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    const MAX_LEN: usize = 128;

    /// Creates a validated tenant id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTenantId`] for empty, overlong or
    /// out-of-charset values.
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.len() > Self::MAX_LEN {
            Some("must be at most 128 characters")
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some("contains characters outside [A-Za-z0-9_-]")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ConfigError::InvalidTenantId {
                tenant_id: id,
                reason,
            }),
            None => Ok(Self(id)),
        }
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TenantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

/// A validated host URL for the application.
///
/// ```rust
/// use shopify_tenant_oauth::HostUrl;
///
/// let url = HostUrl::new("https://myapp.example.com/").unwrap();
/// assert_eq!(url.scheme(), "https");
/// assert_eq!(url.host_name(), Some("myapp.example.com"));
/// assert_eq!(url.join("/shopify/callback"), "https://myapp.example.com/shopify/callback");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostUrl {
    url: String,
    scheme_end: usize,
    host_start: usize,
    host_end: usize,
}

impl HostUrl {
    /// Creates a new validated host URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHostUrl`] if the URL is invalid.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let url = url.trim().trim_end_matches('/').to_string();

        let scheme_end = url
            .find("://")
            .ok_or_else(|| ConfigError::InvalidHostUrl { url: url.clone() })?;

        let scheme = &url[..scheme_end];
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidHostUrl { url });
        }

        let host_start = scheme_end + 3;
        if host_start >= url.len() {
            return Err(ConfigError::InvalidHostUrl { url });
        }

        let remainder = &url[host_start..];
        let host_end = remainder
            .find([':', '/', '?', '#'])
            .map_or(url.len(), |i| host_start + i);

        if host_end == host_start {
            return Err(ConfigError::InvalidHostUrl { url });
        }

        Ok(Self {
            url,
            scheme_end,
            host_start,
            host_end,
        })
    }

    /// Returns the URL scheme (e.g., "https").
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.url[..self.scheme_end]
    }

    /// Returns the host name portion of the URL.
    #[must_use]
    pub fn host_name(&self) -> Option<&str> {
        let host = &self.url[self.host_start..self.host_end];
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// Appends `path` to the URL, inserting exactly one `/` between them.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

impl AsRef<str> for HostUrl {
    fn as_ref(&self) -> &str {
        &self.url
    }
}
