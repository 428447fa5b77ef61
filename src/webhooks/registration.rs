//! Registration of the `app/uninstalled` webhook.

use crate::config::{ApiVersion, HostUrl, ShopDomain};
use crate::webhooks::WebhookError;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Topic fired when a merchant removes the app.
pub const APP_UNINSTALLED_TOPIC: &str = "app/uninstalled";

/// Header carrying the shop access token on Admin API calls.
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

const ALREADY_REGISTERED_MARKERS: [&str; 3] =
    ["already been taken", "already registered", "already exists"];

/// Successful registration outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new subscription was created.
    Registered,
    /// Shopify reported an identical subscription already exists.
    AlreadyRegistered,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    webhook: WebhookDefinition<'a>,
}

#[derive(Serialize)]
struct WebhookDefinition<'a> {
    topic: &'a str,
    address: &'a str,
    format: &'a str,
}

/// Registers webhooks through the REST Admin API.
#[derive(Clone, Debug)]
pub struct WebhookRegistrar {
    http: reqwest::Client,
    api_version: ApiVersion,
    api_host: Option<HostUrl>,
}

impl WebhookRegistrar {
    /// Creates a registrar. `api_host` replaces `https://{shop}` when set.
    #[must_use]
    pub const fn new(http: reqwest::Client, api_version: ApiVersion, api_host: Option<HostUrl>) -> Self {
        Self {
            http,
            api_version,
            api_host,
        }
    }

    fn webhooks_url(&self, shop: &ShopDomain) -> String {
        let path = self.api_version.admin_path("webhooks.json");
        self.api_host.as_ref().map_or_else(
            || format!("https://{shop}{path}"),
            |host| host.join(&path),
        )
    }

    /// Subscribes `callback_url` to `app/uninstalled` for `shop`.
    ///
    /// A 422 saying the address is already taken counts as success.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::Network`] if no response arrived
    /// - [`WebhookError::Rejected`] for any other non-2xx response
    #[tracing::instrument(skip_all, fields(shop = %shop))]
    pub async fn register_app_uninstall_webhook(
        &self,
        shop: &ShopDomain,
        access_token: &SecretString,
        callback_url: &str,
    ) -> Result<RegistrationOutcome, WebhookError> {
        let body = WebhookBody {
            webhook: WebhookDefinition {
                topic: APP_UNINSTALLED_TOPIC,
                address: callback_url,
                format: "json",
            },
        };

        let response = self
            .http
            .post(self.webhooks_url(shop))
            .header(ACCESS_TOKEN_HEADER, access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(WebhookError::Network)?;

        let status = response.status();
        if status.is_success() {
            return Ok(RegistrationOutcome::Registered);
        }

        let text = response.text().await.unwrap_or_default();
        if status.as_u16() == 422 && is_already_registered(&text) {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }
        Err(WebhookError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

fn is_already_registered(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ALREADY_REGISTERED_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CALLBACK: &str = "https://connector.example.com/webhooks/app-uninstalled";

    fn shop() -> ShopDomain {
        ShopDomain::new("hook-shop.myshopify.com").unwrap()
    }

    async fn register(server: &MockServer) -> Result<RegistrationOutcome, WebhookError> {
        WebhookRegistrar::new(
            reqwest::Client::new(),
            ApiVersion::V2026_07,
            Some(HostUrl::new(server.uri()).unwrap()),
        )
        .register_app_uninstall_webhook(&shop(), &SecretString::from("shpat_abc"), CALLBACK)
        .await
    }

    #[test]
    fn test_webhooks_url_uses_versioned_admin_path() {
        let registrar = WebhookRegistrar::new(reqwest::Client::new(), ApiVersion::V2026_07, None);
        assert_eq!(
            registrar.webhooks_url(&shop()),
            "https://hook-shop.myshopify.com/admin/api/2026-07/webhooks.json"
        );
    }

    #[tokio::test]
    async fn test_registration_sends_topic_address_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2026-07/webhooks.json"))
            .and(header(ACCESS_TOKEN_HEADER, "shpat_abc"))
            .and(body_json(serde_json::json!({
                "webhook": {
                    "topic": "app/uninstalled",
                    "address": CALLBACK,
                    "format": "json"
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "webhook": {"id": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(register(&server).await.unwrap(), RegistrationOutcome::Registered);
    }

    #[tokio::test]
    async fn test_already_taken_422_counts_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "errors": {"address": ["for this topic has already been taken"]}
            })))
            .mount(&server)
            .await;

        assert_eq!(
            register(&server).await.unwrap(),
            RegistrationOutcome::AlreadyRegistered
        );
    }

    #[tokio::test]
    async fn test_other_422_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("address is invalid"))
            .mount(&server)
            .await;

        let err = register(&server).await.unwrap_err();
        assert!(matches!(err, WebhookError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = register(&server).await.unwrap_err();
        assert!(matches!(err, WebhookError::Rejected { status: 500, .. }));
    }

    #[test]
    fn test_already_registered_markers_are_case_insensitive() {
        assert!(is_already_registered("Address Already Exists"));
        assert!(is_already_registered("webhook already registered"));
        assert!(!is_already_registered("forbidden"));
    }
}
