//! OAuth scope lists.
//!
//! [`AuthScopes`] keeps scopes in the order they were configured so the
//! authorize URL is stable. Coverage checks treat `write_x` as implying
//! `read_x`, matching how Shopify reports granted scopes.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An ordered, de-duplicated list of OAuth scopes.
///
/// Serializes to and from the comma-separated wire form.
///
/// # Example
///
/// ```rust
/// use shopify_tenant_oauth::AuthScopes;
///
/// let requested: AuthScopes = "write_products, read_orders".parse().unwrap();
/// assert_eq!(requested.to_string(), "write_products,read_orders");
///
/// let granted: AuthScopes = "read_orders,write_products".parse().unwrap();
/// assert!(granted.covers(&"read_products".parse().unwrap()));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AuthScopes {
    scopes: Vec<String>,
}

impl AuthScopes {
    /// Creates an empty scope list.
    #[must_use]
    pub const fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Returns `true` if no scopes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Number of distinct scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns an iterator over the scopes in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    /// Returns `true` if every scope in `other` is held directly or implied.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.iter().all(|scope| self.grants(scope))
    }

    /// Scopes from `required` that this list does not grant.
    #[must_use]
    pub fn missing_from(&self, required: &Self) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.grants(scope))
            .map(str::to_string)
            .collect()
    }

    fn grants(&self, scope: &str) -> bool {
        self.iter()
            .any(|held| held == scope || Self::implied_by(held).as_deref() == Some(scope))
    }

    fn implied_by(scope: &str) -> Option<String> {
        scope
            .strip_prefix("unauthenticated_write_")
            .map(|rest| format!("unauthenticated_read_{rest}"))
            .or_else(|| scope.strip_prefix("write_").map(|rest| format!("read_{rest}")))
    }
}

impl FromStr for AuthScopes {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut scopes: Vec<String> = Vec::new();

        for scope in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !scope.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::InvalidScopes {
                    reason: format!("Invalid characters in scope: '{scope}'"),
                });
            }
            if !scopes.iter().any(|existing| existing == scope) {
                scopes.push(scope.to_string());
            }
        }

        Ok(Self { scopes })
    }
}

impl fmt::Display for AuthScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scopes.join(","))
    }
}

impl Serialize for AuthScopes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AuthScopes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
