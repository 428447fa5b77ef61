//! The install and callback protocols.
//!
//! [`OAuthFlow`] drives one shop through
//!
//! ```text
//! install:  ReceivedInstall → DomainValidated → HmacVerified → AlreadyConnected
//!                                                            ↘ NonceIssued
//! callback: ReceivedCallback → DomainValidated → HmacVerified → NonceConsumed
//!           → TokenExchanged → TokenStored → WebhookRegistered → RedirectedToApp
//! ```
//!
//! Validation fails fast in that order. Nonce and token state lives in the
//! shop's tenant actor; provider HTTP calls happen here, outside the actor,
//! and are bounded by the configured HTTP timeout. Once a nonce is consumed
//! any later failure ends the attempt; the merchant restarts the install.

use crate::auth::oauth::authorize::{build_authorize_url, embedded_escape_html};
use crate::auth::oauth::hmac::verify_with_secrets;
use crate::auth::AuthScopes;
use crate::auth::oauth::{
    AccessTokenService, AuthParams, CallbackRequest, InstallRequest, NonceManager, NonceStatus,
    OAuthError, OAuthState,
};
use crate::config::{
    AppConfig, EnvironmentConfig, ShopDomain, StaticEnvironment, TenantId, UNINSTALL_WEBHOOK_PATH,
};
use crate::tenant::TenantRegistry;
use crate::webhooks::{RegistrationOutcome, WebhookError, WebhookRegistrar};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Steps of the install/callback state machine, as recorded in traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStage {
    /// Install request accepted for processing.
    ReceivedInstall,
    /// Callback request accepted for processing.
    ReceivedCallback,
    /// `shop` passed validation.
    DomainValidated,
    /// Request `hmac` verified.
    HmacVerified,
    /// The shop already has a token; install ends here.
    AlreadyConnected,
    /// A nonce was stored and the merchant sent to authorize.
    NonceIssued,
    /// The callback's nonce was consumed.
    NonceConsumed,
    /// The authorization code was exchanged.
    TokenExchanged,
    /// The token was persisted.
    TokenStored,
    /// The uninstall webhook registration was attempted.
    WebhookRegistered,
    /// The merchant was sent to the tenant app.
    RedirectedToApp,
}

impl FlowStage {
    /// Snake-case name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReceivedInstall => "received_install",
            Self::ReceivedCallback => "received_callback",
            Self::DomainValidated => "domain_validated",
            Self::HmacVerified => "hmac_verified",
            Self::AlreadyConnected => "already_connected",
            Self::NonceIssued => "nonce_issued",
            Self::NonceConsumed => "nonce_consumed",
            Self::TokenExchanged => "token_exchanged",
            Self::TokenStored => "token_stored",
            Self::WebhookRegistered => "webhook_registered",
            Self::RedirectedToApp => "redirected_to_app",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: FlowStage) {
    tracing::debug!(stage = stage.as_str(), "OAuth flow stage");
}

/// How an install request is answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Redirect to Shopify's authorize page.
    Redirect {
        /// Authorize URL.
        url: String,
    },
    /// Serve an HTML page that redirects the top window (embedded installs).
    EmbeddedEscape {
        /// Authorize URL.
        url: String,
        /// The escape document.
        html: String,
    },
    /// The shop is already connected; redirect to the tenant app.
    AlreadyConnected {
        /// Tenant app URL.
        url: String,
    },
}

impl InstallOutcome {
    /// Where the merchant ends up.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Redirect { url } | Self::EmbeddedEscape { url, .. } | Self::AlreadyConnected { url } => {
                url
            }
        }
    }
}

/// Result of a completed callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// The connected shop.
    pub shop: ShopDomain,
    /// The tenant the token was stored under.
    pub tenant: TenantId,
    /// Granted scopes, verbatim.
    pub scope: String,
    /// Tenant app URL to redirect to.
    pub redirect_url: String,
    /// Webhook registration result, `None` if it failed.
    pub webhook: Option<RegistrationOutcome>,
}

/// Answer to a connection status query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Whether a token is stored for the shop.
    pub connected: bool,
    /// The queried shop.
    pub shop: ShopDomain,
    /// Granted scopes when connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Answer to a disconnect request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DisconnectOutcome {
    /// Always `true` once the token is gone.
    pub success: bool,
}

/// Orchestrates install, callback and disconnect for all tenants.
#[derive(Clone)]
pub struct OAuthFlow {
    config: Arc<AppConfig>,
    environment: Arc<dyn EnvironmentConfig>,
    tenants: Arc<TenantRegistry>,
    tokens: AccessTokenService,
    webhooks: WebhookRegistrar,
}

impl fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("config", &self.config)
            .field("tenants", &self.tenants)
            .finish_non_exhaustive()
    }
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthFlow>();
};

impl OAuthFlow {
    /// Builds the outbound HTTP client used for provider calls.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot initialize.
    pub fn http_client(config: &AppConfig) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.http_timeout())
            .build()
    }

    /// Creates a flow from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        environment: Arc<dyn EnvironmentConfig>,
        tenants: Arc<TenantRegistry>,
        http: reqwest::Client,
    ) -> Self {
        let api_host = config.api_host().cloned();
        let tokens = AccessTokenService::new(http.clone(), api_host.clone(), Arc::clone(&tenants));
        let webhooks = WebhookRegistrar::new(http, config.api_version().clone(), api_host);
        Self {
            config,
            environment,
            tenants,
            tokens,
            webhooks,
        }
    }

    /// Creates a flow with a [`StaticEnvironment`] and a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, reqwest::Error> {
        let http = Self::http_client(&config)?;
        let environment = Arc::new(StaticEnvironment::from_config(&config));
        let tenants = Arc::new(TenantRegistry::new(config.tenant_storage().clone()));
        Ok(Self::new(Arc::new(config), environment, tenants, http))
    }

    /// Application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The tenant actor registry.
    #[must_use]
    pub const fn tenants(&self) -> &Arc<TenantRegistry> {
        &self.tenants
    }

    /// The token service.
    #[must_use]
    pub const fn tokens(&self) -> &AccessTokenService {
        &self.tokens
    }

    fn nonces(&self, shop: &ShopDomain) -> NonceManager {
        NonceManager::new(self.tenants.handle(shop), self.config.nonce_ttl())
    }

    fn timeout(&self) -> Duration {
        self.config.http_timeout()
    }

    fn validate_signed(&self, params: &AuthParams) -> Result<ShopDomain, OAuthError> {
        let shop = ShopDomain::new(params.get("shop").unwrap_or_default())?;
        enter(FlowStage::DomainValidated);
        tracing::Span::current().record("shop", tracing::field::display(&shop));

        let verified = verify_with_secrets(
            params,
            self.config.api_secret_key().as_ref(),
            self.config.old_api_secret_key().map(AsRef::as_ref),
        );
        if !verified {
            tracing::warn!(shop = %shop, "HMAC verification failed");
            return Err(OAuthError::InvalidHmac);
        }
        enter(FlowStage::HmacVerified);
        Ok(shop)
    }

    /// Handles `GET|POST /shopify/{tenant}/install`.
    ///
    /// `params` is the merged query and body.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::InvalidShopDomain`] / [`OAuthError::InvalidHmac`] for
    ///   untrusted requests
    /// - [`OAuthError::InvalidRequest`] if `timestamp` is missing
    /// - [`OAuthError::MissingConfig`] if no scopes are configured
    /// - [`OAuthError::Storage`] if the tenant store fails
    #[tracing::instrument(skip_all, fields(tenant = %tenant, shop = tracing::field::Empty))]
    pub async fn handle_install(
        &self,
        tenant: &TenantId,
        params: &AuthParams,
    ) -> Result<InstallOutcome, OAuthError> {
        enter(FlowStage::ReceivedInstall);
        let shop = self.validate_signed(params)?;
        let request = InstallRequest::from_params(params)?;

        if self.tokens.retrieve(&shop).await?.is_some() {
            enter(FlowStage::AlreadyConnected);
            tracing::info!("Shop already connected");
            return Ok(InstallOutcome::AlreadyConnected {
                url: self.environment.organization_url(tenant),
            });
        }

        if self.config.scopes().is_empty() {
            return Err(OAuthError::MissingConfig { field: "scopes" });
        }

        let nonces = self.nonces(&shop);
        let nonce = NonceManager::generate();
        nonces.store(&nonce).await?;
        enter(FlowStage::NonceIssued);

        let state = OAuthState::new(tenant.clone(), nonce).encode(self.config.api_secret_key().as_ref());
        let url = build_authorize_url(
            &shop,
            self.config.api_key(),
            self.config.scopes(),
            &self.environment.oauth_callback_url(),
            &state,
            self.config.online_tokens(),
        );

        tracing::info!(embedded = request.is_embedded(), "Redirecting to authorize");
        if request.is_embedded() {
            let html = embedded_escape_html(&url);
            Ok(InstallOutcome::EmbeddedEscape { url, html })
        } else {
            Ok(InstallOutcome::Redirect { url })
        }
    }

    /// Handles `GET|POST /shopify/callback`.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::InvalidShopDomain`] / [`OAuthError::InvalidHmac`] for
    ///   untrusted requests
    /// - [`OAuthError::InvalidRequest`] if `code`, `state` or `timestamp` is
    ///   missing
    /// - [`OAuthError::InvalidNonce`] if the state is forged or its nonce is
    ///   unknown, consumed or expired; no exchange is attempted
    /// - [`OAuthError::AccessToken`] / [`OAuthError::Timeout`] if the
    ///   exchange fails
    /// - [`OAuthError::Storage`] if the tenant store fails
    #[tracing::instrument(skip_all, fields(tenant = tracing::field::Empty, shop = tracing::field::Empty))]
    pub async fn handle_callback(&self, params: &AuthParams) -> Result<CallbackOutcome, OAuthError> {
        enter(FlowStage::ReceivedCallback);
        let shop = self.validate_signed(params)?;
        let request = CallbackRequest::from_params(params)?;

        let state = OAuthState::decode(
            &request.state,
            self.config.api_secret_key().as_ref(),
            self.config.old_api_secret_key().map(AsRef::as_ref),
        )?;
        let tenant = state.tenant().clone();
        tracing::Span::current().record("tenant", tracing::field::display(&tenant));

        let nonces = self.nonces(&shop);
        let status = nonces.status(state.nonce()).await?;
        if status != NonceStatus::Pending {
            tracing::warn!(?status, "Callback nonce rejected");
            return Err(OAuthError::InvalidNonce {
                reason: format!("nonce is {status}"),
            });
        }
        nonces.consume(state.nonce()).await?;
        enter(FlowStage::NonceConsumed);

        let grant = tokio::time::timeout(
            self.timeout(),
            self.tokens.exchange_code_for_token(
                &shop,
                &request.code,
                self.config.api_key(),
                self.config.api_secret_key(),
            ),
        )
        .await
        .map_err(|_| OAuthError::Timeout {
            operation: "token exchange",
        })??;
        enter(FlowStage::TokenExchanged);

        if let Ok(granted) = grant.scope.parse::<AuthScopes>() {
            let missing = granted.missing_from(self.config.scopes());
            if !missing.is_empty() {
                tracing::warn!(missing = %missing.join(","), "Granted scopes narrower than requested");
            }
        }

        self.tokens
            .store(&shop, grant.access_token.clone(), &grant.scope, &tenant)
            .await?;
        enter(FlowStage::TokenStored);

        let webhook = self.register_uninstall_webhook(&shop, &grant.access_token).await;
        enter(FlowStage::WebhookRegistered);

        let redirect_url = self.environment.organization_url(&tenant);
        enter(FlowStage::RedirectedToApp);
        tracing::info!("Shop connected");
        Ok(CallbackOutcome {
            shop,
            tenant,
            scope: grant.scope,
            redirect_url,
            webhook,
        })
    }

    async fn register_uninstall_webhook(
        &self,
        shop: &ShopDomain,
        access_token: &secrecy::SecretString,
    ) -> Option<RegistrationOutcome> {
        let address = self.environment.webhook_url(UNINSTALL_WEBHOOK_PATH);
        let attempt = tokio::time::timeout(
            self.timeout(),
            self.webhooks
                .register_app_uninstall_webhook(shop, access_token, &address),
        )
        .await;

        match attempt {
            Ok(Ok(RegistrationOutcome::Registered)) => {
                tracing::info!("Uninstall webhook registered");
                Some(RegistrationOutcome::Registered)
            }
            Ok(Ok(RegistrationOutcome::AlreadyRegistered)) => {
                tracing::info!("Uninstall webhook already registered");
                Some(RegistrationOutcome::AlreadyRegistered)
            }
            Ok(Err(WebhookError::Rejected { status, body })) => {
                tracing::warn!(status, body = %body, "Uninstall webhook registration rejected");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Uninstall webhook registration failed");
                None
            }
            Err(_) => {
                tracing::warn!("Uninstall webhook registration timed out");
                None
            }
        }
    }

    /// Reports whether `shop` has a stored token.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the tenant store fails.
    #[tracing::instrument(skip_all, fields(shop = %shop))]
    pub async fn check_connection_status(
        &self,
        shop: &ShopDomain,
    ) -> Result<ConnectionStatus, OAuthError> {
        let token = self.tokens.retrieve(shop).await?;
        Ok(ConnectionStatus {
            connected: token.is_some(),
            shop: shop.clone(),
            scope: token.map(|t| t.scope),
        })
    }

    /// Deletes the stored token for `shop`.
    ///
    /// The token is not revoked at Shopify.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the tenant store fails.
    #[tracing::instrument(skip_all, fields(shop = %shop))]
    pub async fn disconnect(&self, shop: &ShopDomain) -> Result<DisconnectOutcome, OAuthError> {
        let existed = self.tokens.delete(shop).await?;
        tracing::info!(existed, "Shop disconnected");
        Ok(DisconnectOutcome { success: true })
    }

    /// Handles a verified `app/uninstalled` webhook; returns whether a
    /// token existed.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the tenant store fails.
    #[tracing::instrument(skip_all, fields(shop = %shop))]
    pub async fn handle_app_uninstalled(&self, shop: &ShopDomain) -> Result<bool, OAuthError> {
        let existed = self.tokens.delete(shop).await?;
        tracing::info!(existed, "App uninstalled");
        Ok(existed)
    }
}
