//! Authorize URL construction and the embedded-app escape page.

use crate::auth::AuthScopes;
use crate::config::{ApiKey, ShopDomain};

/// Path of Shopify's authorize endpoint on the shop domain.
pub const AUTHORIZE_PATH: &str = "/admin/oauth/authorize";

/// Builds the URL the merchant is sent to for granting access.
///
/// Keys and values are percent-encoded. `grant_options[]=per-user` is
/// appended for online (per-user) tokens.
///
/// ```rust
/// use shopify_tenant_oauth::auth::oauth::build_authorize_url;
/// use shopify_tenant_oauth::{ApiKey, ShopDomain};
///
/// let url = build_authorize_url(
///     &ShopDomain::new("test-shop.myshopify.com").unwrap(),
///     &ApiKey::new("key").unwrap(),
///     &"read_products".parse().unwrap(),
///     "https://app.example.com/shopify/callback",
///     "abc.def",
///     false,
/// );
/// assert!(url.starts_with("https://test-shop.myshopify.com/admin/oauth/authorize?client_id=key"));
/// assert!(url.ends_with("&state=abc.def"));
/// ```
#[must_use]
pub fn build_authorize_url(
    shop: &ShopDomain,
    client_id: &ApiKey,
    scopes: &AuthScopes,
    redirect_uri: &str,
    state: &str,
    online: bool,
) -> String {
    let mut params = vec![
        ("client_id", client_id.as_ref().to_string()),
        ("scope", scopes.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
        ("state", state.to_string()),
    ];
    if online {
        params.push(("grant_options[]", "per-user".to_string()));
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("https://{shop}{AUTHORIZE_PATH}?{query}")
}

/// HTML page that breaks out of the Shopify admin iframe and navigates the
/// top window to `target`.
#[must_use]
pub fn embedded_escape_html(target: &str) -> String {
    // A JSON string is a valid JS string literal; `<` is escaped so the
    // value cannot close the script element.
    let literal = serde_json::Value::String(target.to_string())
        .to_string()
        .replace('<', "\\u003c");
    let attribute = target
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;");
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Redirecting</title>\n\
         <script>window.top.location.href = {literal};</script>\n\
         </head>\n<body>\n<a href=\"{attribute}\" target=\"_top\">Continue</a>\n</body>\n</html>\n"
    )
}
