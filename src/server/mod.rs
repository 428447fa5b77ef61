//! HTTP surface.
//!
//! # Routes
//!
//! ```text
//! GET|POST /shopify/{tenant_id}/install  - Start an install (302 or escape page)
//! GET|POST /shopify/callback             - Finish an install (302 to tenant app)
//! GET      /shopify/status?shop=         - {connected, shop, scope?}
//! POST     /shopify/disconnect           - Delete the shop's token
//! POST     /webhooks/app-uninstalled     - Verified uninstall webhook
//! GET      /health                       - Liveness
//! ```
//!
//! Errors are JSON `{error, kind}` with the status from [`AppError`].

mod error;
mod extract;
mod handlers;

pub use error::AppError;
pub use extract::RequestParams;

use crate::auth::oauth::OAuthFlow;
use crate::config::{CALLBACK_PATH, UNINSTALL_WEBHOOK_PATH};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<OAuthFlow>,
}

impl AppState {
    /// Wraps a flow for sharing across handlers.
    #[must_use]
    pub fn new(flow: OAuthFlow) -> Self {
        Self {
            inner: Arc::new(flow),
        }
    }

    /// The OAuth flow.
    #[must_use]
    pub fn flow(&self) -> &OAuthFlow {
        &self.inner
    }
}

/// Builds the router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/shopify/{tenant_id}/install",
            get(handlers::install).post(handlers::install),
        )
        .route(
            CALLBACK_PATH,
            get(handlers::callback).post(handlers::callback),
        )
        .route("/shopify/status", get(handlers::status))
        .route("/shopify/disconnect", post(handlers::disconnect))
        .route(UNINSTALL_WEBHOOK_PATH, post(handlers::app_uninstalled))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
