//! Request parameters for the install and callback endpoints.
//!
//! Shopify signs the full parameter set it sends, so HMAC verification works
//! on [`AuthParams`] (every key received) while the handlers read typed
//! fields from [`InstallRequest`] and [`CallbackRequest`].

use crate::auth::oauth::OAuthError;
use std::collections::BTreeMap;

/// A merged, key-sorted view of request parameters.
///
/// Later insertions for the same key replace earlier ones, which is how body
/// values override query values.
///
/// # Example
///
/// ```rust
/// use shopify_tenant_oauth::auth::oauth::AuthParams;
///
/// let query = AuthParams::from_pairs([("shop", "a.myshopify.com"), ("embedded", "0")]);
/// let body = AuthParams::from_pairs([("embedded", "1")]);
/// let merged = query.merged_with(body);
///
/// assert_eq!(merged.get("embedded"), Some("1"));
/// assert_eq!(merged.signable_string(), "embedded=1&shop=a.myshopify.com");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthParams {
    entries: BTreeMap<String, String>,
}

impl AuthParams {
    /// Creates an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs; the last value for a key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key, value);
        }
        params
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the value for `key` unless it is empty.
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Returns `true` when no parameters are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlays `other` on top of `self`.
    #[must_use]
    pub fn merged_with(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Canonical message covered by Shopify's `hmac` parameter.
    ///
    /// Drops `hmac` and `signature`, keeps key order, escapes `%`, `&` and
    /// `=` in keys and values, then joins `key=value` pairs with `&`.
    #[must_use]
    pub fn signable_string(&self) -> String {
        self.entries
            .iter()
            .filter(|(key, _)| key.as_str() != "hmac" && key.as_str() != "signature")
            .map(|(key, value)| format!("{}={}", escape_component(key), escape_component(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '&' => escaped.push_str("%26"),
            '=' => escaped.push_str("%3D"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn required(params: &AuthParams, key: &'static str) -> Result<String, OAuthError> {
    params
        .get_non_empty(key)
        .map(str::to_string)
        .ok_or_else(|| OAuthError::InvalidRequest {
            reason: format!("missing required parameter '{key}'"),
        })
}

/// Parameters Shopify sends when a merchant starts an install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallRequest {
    /// Raw shop domain, validated later by the flow.
    pub shop: String,
    /// Request timestamp in seconds.
    pub timestamp: String,
    /// Hex HMAC over the other parameters.
    pub hmac: String,
    /// `"1"` when the app is loaded inside the Shopify admin iframe.
    pub embedded: Option<String>,
    /// Base64 host value supplied by the admin.
    pub host: Option<String>,
}

impl InstallRequest {
    /// Reads an install request from merged parameters.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidRequest`] if `shop`, `timestamp` or
    /// `hmac` is missing.
    pub fn from_params(params: &AuthParams) -> Result<Self, OAuthError> {
        Ok(Self {
            shop: required(params, "shop")?,
            timestamp: required(params, "timestamp")?,
            hmac: required(params, "hmac")?,
            embedded: params.get("embedded").map(str::to_string),
            host: params.get("host").map(str::to_string),
        })
    }

    /// Writes the request back to a parameter map.
    #[must_use]
    pub fn to_params(&self) -> AuthParams {
        let mut params = AuthParams::from_pairs([
            ("shop", self.shop.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("hmac", self.hmac.as_str()),
        ]);
        if let Some(embedded) = &self.embedded {
            params.insert("embedded", embedded.as_str());
        }
        if let Some(host) = &self.host {
            params.insert("host", host.as_str());
        }
        params
    }

    /// Returns `true` when the install must escape the admin iframe.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.embedded.as_deref() == Some("1")
    }
}

/// Parameters Shopify sends to the OAuth callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackRequest {
    /// One-time authorization code.
    pub code: String,
    /// Hex HMAC over the other parameters.
    pub hmac: String,
    /// Raw shop domain, validated later by the flow.
    pub shop: String,
    /// Signed state minted during install.
    pub state: String,
    /// Request timestamp in seconds.
    pub timestamp: String,
    /// Base64 host value supplied by the admin.
    pub host: Option<String>,
}

impl CallbackRequest {
    /// Reads a callback request from merged parameters.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidRequest`] if any required parameter is
    /// missing or empty.
    pub fn from_params(params: &AuthParams) -> Result<Self, OAuthError> {
        Ok(Self {
            code: required(params, "code")?,
            hmac: required(params, "hmac")?,
            shop: required(params, "shop")?,
            state: required(params, "state")?,
            timestamp: required(params, "timestamp")?,
            host: params.get("host").map(str::to_string),
        })
    }

    /// Writes the request back to a parameter map.
    #[must_use]
    pub fn to_params(&self) -> AuthParams {
        let mut params = AuthParams::from_pairs([
            ("code", self.code.as_str()),
            ("hmac", self.hmac.as_str()),
            ("shop", self.shop.as_str()),
            ("state", self.state.as_str()),
            ("timestamp", self.timestamp.as_str()),
        ]);
        if let Some(host) = &self.host {
            params.insert("host", host.as_str());
        }
        params
    }
}
