//! Authorization-code exchange and per-shop token storage.
//!
//! The exchange is a single POST to Shopify's token endpoint with no retry:
//! authorization codes are single-use, so replaying a request that may have
//! reached Shopify can only fail. Storage goes through the shop's tenant
//! actor.

use crate::config::{ApiKey, ApiSecretKey, HostUrl, ShopDomain, TenantId};
use crate::tenant::{StorageError, TenantRegistry};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Token endpoint path, relative to the shop (or `api_host`) base URL.
pub const ACCESS_TOKEN_PATH: &str = "/admin/oauth/access_token";

/// Failures of the code-for-token exchange.
#[derive(Debug, Error)]
pub enum AccessTokenError {
    /// The request never produced an HTTP response.
    #[error("Token exchange request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// Shopify answered with a non-success status.
    #[error("Token exchange failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// Shopify answered 2xx but the body was not a token grant.
    #[error("Token exchange returned a malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong with the body.
        reason: String,
    },
}

/// Result of a successful exchange.
#[derive(Clone)]
pub struct TokenGrant {
    /// The long-lived access token.
    pub access_token: SecretString,
    /// Comma-separated granted scopes, verbatim.
    pub scope: String,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// An access token as persisted for a shop.
#[derive(Clone)]
pub struct StoredAccessToken {
    /// Shop the token grants access to.
    pub shop: ShopDomain,
    /// Tenant that connected the shop.
    pub tenant_id: TenantId,
    /// The access token (redacted in `Debug`).
    pub access_token: SecretString,
    /// Comma-separated granted scopes.
    pub scope: String,
    /// When the token was stored.
    pub obtained_at: DateTime<Utc>,
}

impl fmt::Debug for StoredAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAccessToken")
            .field("shop", &self.shop)
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

#[derive(serde::Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    #[serde(default)]
    scope: String,
}

/// Exchanges authorization codes and manages stored tokens.
#[derive(Clone, Debug)]
pub struct AccessTokenService {
    http: reqwest::Client,
    api_host: Option<HostUrl>,
    tenants: Arc<TenantRegistry>,
}

impl AccessTokenService {
    /// Creates a service. `api_host` replaces `https://{shop}` when set.
    #[must_use]
    pub const fn new(
        http: reqwest::Client,
        api_host: Option<HostUrl>,
        tenants: Arc<TenantRegistry>,
    ) -> Self {
        Self {
            http,
            api_host,
            tenants,
        }
    }

    fn token_url(&self, shop: &ShopDomain) -> String {
        self.api_host.as_ref().map_or_else(
            || format!("https://{shop}{ACCESS_TOKEN_PATH}"),
            |host| host.join(ACCESS_TOKEN_PATH),
        )
    }

    /// Exchanges a one-time authorization code for an access token.
    ///
    /// # Errors
    ///
    /// - [`AccessTokenError::Network`] if no response arrived
    /// - [`AccessTokenError::Status`] for a non-2xx response
    /// - [`AccessTokenError::MalformedResponse`] if the 2xx body lacks a token
    #[tracing::instrument(skip_all, fields(shop = %shop))]
    pub async fn exchange_code_for_token(
        &self,
        shop: &ShopDomain,
        code: &str,
        client_id: &ApiKey,
        client_secret: &ApiSecretKey,
    ) -> Result<TokenGrant, AccessTokenError> {
        let request_body = TokenExchangeRequest {
            client_id: client_id.as_ref(),
            client_secret: client_secret.as_ref(),
            code,
        };

        let response = self
            .http
            .post(self.token_url(shop))
            .json(&request_body)
            .send()
            .await
            .map_err(AccessTokenError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(AccessTokenError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenExchangeResponse =
            response
                .json()
                .await
                .map_err(|e| AccessTokenError::MalformedResponse {
                    reason: e.to_string(),
                })?;

        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AccessTokenError::MalformedResponse {
                reason: "missing access_token".to_string(),
            })?;

        Ok(TokenGrant {
            access_token: SecretString::from(access_token),
            scope: parsed.scope,
        })
    }

    /// Stores the token for `shop`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the tenant store fails.
    pub async fn store(
        &self,
        shop: &ShopDomain,
        token: SecretString,
        scope: &str,
        tenant_id: &TenantId,
    ) -> Result<(), StorageError> {
        let record = StoredAccessToken {
            shop: shop.clone(),
            tenant_id: tenant_id.clone(),
            access_token: token,
            scope: scope.to_string(),
            obtained_at: Utc::now(),
        };
        self.tenants.handle(shop).store_token(record).await
    }

    /// Returns the stored token for `shop`, if any.
    ///
    /// A shop without tenant state is answered `None` without creating any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the tenant store fails; absence is
    /// `Ok(None)`.
    pub async fn retrieve(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<StoredAccessToken>, StorageError> {
        match self.tenants.existing(shop) {
            Some(tenant) => tenant.retrieve_token().await,
            None => Ok(None),
        }
    }

    /// Deletes the stored token for `shop`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the tenant store fails.
    pub async fn delete(&self, shop: &ShopDomain) -> Result<bool, StorageError> {
        match self.tenants.existing(shop) {
            Some(tenant) => tenant.delete_token().await,
            None => Ok(false),
        }
    }
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<AccessTokenError>();
    assert_send_sync::<AccessTokenService>();
};
