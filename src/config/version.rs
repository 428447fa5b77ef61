//! Admin API version used for post-authorization calls.
//!
//! Only the webhook registration call is versioned; the OAuth endpoints
//! themselves are unversioned.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Shopify Admin API version.
///
/// Shopify releases versions quarterly. Known versions get their own
/// variant; any other well-formed `YYYY-MM` string parses as `Custom`.
///
/// # Example
///
/// ```rust
/// use shopify_tenant_oauth::ApiVersion;
///
/// let version: ApiVersion = "2026-07".parse().unwrap();
/// assert_eq!(version, ApiVersion::V2026_07);
/// assert_eq!(version.admin_path("webhooks.json"), "/admin/api/2026-07/webhooks.json");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    /// API version 2025-10.
    V2025_10,
    /// API version 2026-01.
    V2026_01,
    /// API version 2026-04.
    V2026_04,
    /// API version 2026-07.
    V2026_07,
    /// Unstable API version.
    Unstable,
    /// Any other `YYYY-MM` release.
    Custom(String),
}

impl ApiVersion {
    /// Returns the latest stable API version.
    #[must_use]
    pub const fn latest() -> Self {
        Self::V2026_07
    }

    /// Returns `true` for a known stable version.
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        !matches!(self, Self::Unstable | Self::Custom(_))
    }

    /// Builds an Admin REST path under this version.
    #[must_use]
    pub fn admin_path(&self, resource: &str) -> String {
        format!("/admin/api/{self}/{}", resource.trim_start_matches('/'))
    }

    fn is_valid_version_format(s: &str) -> bool {
        let Some((year, month)) = s.split_once('-') else {
            return false;
        };
        year.len() == 4
            && year.chars().all(|c| c.is_ascii_digit())
            && matches!(month, "01" | "04" | "07" | "10")
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version_str = match self {
            Self::V2025_10 => "2025-10",
            Self::V2026_01 => "2026-01",
            Self::V2026_04 => "2026-04",
            Self::V2026_07 => "2026-07",
            Self::Unstable => "unstable",
            Self::Custom(s) => s,
        };
        f.write_str(version_str)
    }
}

impl FromStr for ApiVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "2025-10" => Ok(Self::V2025_10),
            "2026-01" => Ok(Self::V2026_01),
            "2026-04" => Ok(Self::V2026_04),
            "2026-07" => Ok(Self::V2026_07),
            "unstable" => Ok(Self::Unstable),
            _ if Self::is_valid_version_format(&s) => Ok(Self::Custom(s)),
            _ => Err(ConfigError::InvalidApiVersion { version: s }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_parses_known_versions() {
        assert_eq!("2025-10".parse::<ApiVersion>().unwrap(), ApiVersion::V2025_10);
        assert_eq!(" 2026-04 ".parse::<ApiVersion>().unwrap(), ApiVersion::V2026_04);
        assert_eq!("UNSTABLE".parse::<ApiVersion>().unwrap(), ApiVersion::Unstable);
    }

    #[test]
    fn test_api_version_parses_future_versions_as_custom() {
        let version: ApiVersion = "2027-01".parse().unwrap();
        assert_eq!(version, ApiVersion::Custom("2027-01".to_string()));
        assert!(!version.is_stable());
        assert_eq!(version.to_string(), "2027-01");
    }

    #[test]
    fn test_api_version_rejects_invalid() {
        assert!("invalid".parse::<ApiVersion>().is_err());
        assert!("2026".parse::<ApiVersion>().is_err());
        assert!("2026-1".parse::<ApiVersion>().is_err());
        assert!("2026-02".parse::<ApiVersion>().is_err());
        assert!("26-01".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_admin_path() {
        assert_eq!(
            ApiVersion::V2025_10.admin_path("/webhooks.json"),
            "/admin/api/2025-10/webhooks.json"
        );
        assert_eq!(
            ApiVersion::Unstable.admin_path("webhooks.json"),
            "/admin/api/unstable/webhooks.json"
        );
    }

    #[test]
    fn test_default_is_latest() {
        assert_eq!(ApiVersion::default(), ApiVersion::latest());
        assert!(ApiVersion::latest().is_stable());
    }
}
