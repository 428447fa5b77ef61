//! Route handlers.

use crate::auth::oauth::{ConnectionStatus, DisconnectOutcome, InstallOutcome};
use crate::config::{ShopDomain, TenantId};
use crate::server::{AppError, AppState, RequestParams};
use crate::webhooks::{
    verify_webhook, WebhookRequest, HEADER_API_VERSION, HEADER_HMAC, HEADER_SHOP_DOMAIN,
    HEADER_TOPIC, HEADER_WEBHOOK_ID,
};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, X_FRAME_OPTIONS};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::instrument;

fn redirect(url: &str) -> Response {
    (
        StatusCode::FOUND,
        [(LOCATION, url.to_string()), (CACHE_CONTROL, "no-cache".to_string())],
    )
        .into_response()
}

fn shop_param(params: &RequestParams) -> Result<ShopDomain, AppError> {
    let raw = params.0.get("shop").unwrap_or_default();
    ShopDomain::new(raw).map_err(|e| AppError::OAuth(e.into()))
}

/// `GET|POST /shopify/{tenant_id}/install`
#[instrument(skip(state, params))]
pub async fn install(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    params: RequestParams,
) -> Result<Response, AppError> {
    let tenant = TenantId::new(tenant_id).map_err(|e| AppError::BadRequest(e.to_string()))?;

    match state.flow().handle_install(&tenant, &params.0).await? {
        InstallOutcome::Redirect { url } | InstallOutcome::AlreadyConnected { url } => {
            Ok(redirect(&url))
        }
        InstallOutcome::EmbeddedEscape { html, .. } => Ok((
            StatusCode::OK,
            [
                (CONTENT_TYPE, "text/html; charset=utf-8"),
                (X_FRAME_OPTIONS, "ALLOWALL"),
            ],
            html,
        )
            .into_response()),
    }
}

/// `GET|POST /shopify/callback`
#[instrument(skip(state, params))]
pub async fn callback(
    State(state): State<AppState>,
    params: RequestParams,
) -> Result<Response, AppError> {
    let outcome = state.flow().handle_callback(&params.0).await?;
    Ok(redirect(&outcome.redirect_url))
}

/// `GET /shopify/status?shop=`
#[instrument(skip(state, params))]
pub async fn status(
    State(state): State<AppState>,
    params: RequestParams,
) -> Result<Json<ConnectionStatus>, AppError> {
    let shop = shop_param(&params)?;
    Ok(Json(state.flow().check_connection_status(&shop).await?))
}

/// `POST /shopify/disconnect`
#[instrument(skip(state, params))]
pub async fn disconnect(
    State(state): State<AppState>,
    params: RequestParams,
) -> Result<Json<DisconnectOutcome>, AppError> {
    let shop = shop_param(&params)?;
    Ok(Json(state.flow().disconnect(&shop).await?))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /webhooks/app-uninstalled`
#[instrument(skip(state, headers, body))]
pub async fn app_uninstalled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let mut request = WebhookRequest::new(body.to_vec());
    if let Some(value) = header(&headers, HEADER_HMAC) {
        request = request.hmac_header(value);
    }
    if let Some(value) = header(&headers, HEADER_SHOP_DOMAIN) {
        request = request.shop_domain(value);
    }
    if let Some(value) = header(&headers, HEADER_TOPIC) {
        request = request.topic(value);
    }
    if let Some(value) = header(&headers, HEADER_API_VERSION) {
        request = request.api_version(value);
    }
    if let Some(value) = header(&headers, HEADER_WEBHOOK_ID) {
        request = request.webhook_id(value);
    }

    let config = state.flow().config();
    let context = verify_webhook(
        &request,
        config.api_secret_key().as_ref(),
        config.old_api_secret_key().map(AsRef::as_ref),
        config.verify_webhook_hmac(),
    )?;

    tracing::info!(
        shop = %context.shop(),
        webhook_id = context.webhook_id().unwrap_or_default(),
        "Received app/uninstalled"
    );
    state.flow().handle_app_uninstalled(context.shop()).await?;
    Ok(StatusCode::OK)
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
