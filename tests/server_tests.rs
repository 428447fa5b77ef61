//! Integration tests for the HTTP router.
//!
//! Requests are driven through `tower::ServiceExt::oneshot`; no socket is
//! bound.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use shopify_tenant_oauth::auth::oauth::hmac::{compute_signature, compute_signature_base64};
use shopify_tenant_oauth::auth::oauth::{AuthParams, OAuthFlow};
use shopify_tenant_oauth::server::{router, AppState};
use shopify_tenant_oauth::{
    ApiKey, ApiSecretKey, AppConfig, HostUrl, ShopDomain, TenantId, TenantStorage,
};
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const SHOP: &str = "test-shop.myshopify.com";

fn flow(storage: TenantStorage) -> OAuthFlow {
    let config = AppConfig::builder()
        .api_key(ApiKey::new("test-api-key").unwrap())
        .api_secret_key(ApiSecretKey::new(SECRET).unwrap())
        .scopes("read_products".parse().unwrap())
        .host(HostUrl::new("https://connector.example.com").unwrap())
        .organization_url_template("https://app.example.com/orgs/{tenant}/shopify")
        .tenant_storage(storage)
        .build()
        .unwrap();
    OAuthFlow::from_config(config).unwrap()
}

fn app() -> (Router, AppState) {
    let state = AppState::new(flow(TenantStorage::InMemory));
    (router(state.clone()), state)
}

fn signed_query(pairs: &[(&str, &str)]) -> String {
    let mut params = AuthParams::from_pairs(pairs.iter().copied());
    let hmac = compute_signature(&params.signable_string(), SECRET);
    params.insert("hmac", hmac);
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn store_token(state: &AppState) {
    state
        .flow()
        .tokens()
        .store(
            &ShopDomain::new(SHOP).unwrap(),
            SecretString::from("shpat_x"),
            "read_products",
            &TenantId::new("acme").unwrap(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "ok");
}

#[tokio::test]
async fn test_install_redirects_to_authorize_page() {
    let (app, _) = app();
    let query = signed_query(&[("shop", SHOP), ("timestamp", "1700000000")]);
    let response = app
        .oneshot(
            Request::get(format!("/shopify/acme/install?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://test-shop.myshopify.com/admin/oauth/authorize?"));
    assert!(location.contains("client_id=test-api-key"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
}

#[tokio::test]
async fn test_embedded_install_serves_escape_page() {
    let (app, _) = app();
    let query = signed_query(&[
        ("embedded", "1"),
        ("shop", SHOP),
        ("timestamp", "1700000000"),
    ]);
    let response = app
        .oneshot(
            Request::get(format!("/shopify/acme/install?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "ALLOWALL");
    let html = text_body(response).await;
    assert!(html.contains("window.top.location.href"));
    assert!(html.contains("target=\"_top\""));
}

#[tokio::test]
async fn test_install_via_form_post() {
    let (app, _) = app();
    let body = signed_query(&[("shop", SHOP), ("timestamp", "1700000000")]);
    let response = app
        .oneshot(
            Request::post("/shopify/acme/install")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_install_with_bad_hmac_is_unauthorized() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::get(format!(
                "/shopify/acme/install?shop={SHOP}&timestamp=1&hmac=deadbeef"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "InvalidHmacError");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_install_with_invalid_shop_is_bad_request() {
    let (app, _) = app();
    let query = signed_query(&[("shop", "evil.example.com"), ("timestamp", "1")]);
    let response = app
        .oneshot(
            Request::get(format!("/shopify/acme/install?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "InvalidShopDomainError");
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_bad_request() {
    let (app, _) = app();
    let query = signed_query(&[
        ("code", "abc"),
        ("shop", SHOP),
        ("state", "not-a-state"),
        ("timestamp", "1"),
    ]);
    let response = app
        .oneshot(
            Request::get(format!("/shopify/callback?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "InvalidNonceError");
}

#[tokio::test]
async fn test_status_reports_connection() {
    let (app, state) = app();
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/shopify/status?shop={SHOP}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["connected"], false);
    assert_eq!(body["shop"], SHOP);
    assert!(body.get("scope").is_none());

    store_token(&state).await;
    let response = app
        .oneshot(
            Request::get(format!("/shopify/status?shop={SHOP}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["scope"], "read_products");
}

#[tokio::test]
async fn test_status_requires_valid_shop() {
    let (app, _) = app();
    let response = app
        .oneshot(
            Request::get("/shopify/status?shop=nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_removes_token() {
    let (app, state) = app();
    store_token(&state).await;

    let response = app
        .oneshot(
            Request::post("/shopify/disconnect")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(format!(r#"{{"shop":"{SHOP}"}}"#)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);

    let status = state
        .flow()
        .check_connection_status(&ShopDomain::new(SHOP).unwrap())
        .await
        .unwrap();
    assert!(!status.connected);
}

#[tokio::test]
async fn test_unknown_shop_queries_leave_no_tenant_state() {
    let dir = std::env::temp_dir().join(format!("server-{}", uuid::Uuid::new_v4()));
    let state = AppState::new(flow(TenantStorage::Directory(dir.clone())));
    let app = router(state.clone());

    for i in 0..50 {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/shopify/status?shop=junk{i}.myshopify.com"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["connected"], false);
    }
    let response = app
        .oneshot(
            Request::post("/shopify/disconnect")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"shop":"junk-gone.myshopify.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.flow().tenants().len(), 0);
    let databases = std::fs::read_dir(&dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(databases, 0);

    let _ = std::fs::remove_dir_all(dir);
}

fn uninstall_request(shop: Option<&str>, hmac: Option<String>) -> Request<Body> {
    let body = format!(r#"{{"domain":"{SHOP}"}}"#);
    let mut builder = Request::post("/webhooks/app-uninstalled")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Shopify-Topic", "app/uninstalled");
    if let Some(shop) = shop {
        builder = builder.header("X-Shopify-Shop-Domain", shop);
    }
    if let Some(hmac) = hmac {
        builder = builder.header("X-Shopify-Hmac-SHA256", hmac);
    }
    builder.body(Body::from(body)).unwrap()
}

fn webhook_hmac() -> String {
    compute_signature_base64(format!(r#"{{"domain":"{SHOP}"}}"#).as_bytes(), SECRET)
}

#[tokio::test]
async fn test_uninstall_webhook_requires_shop_header() {
    let (app, _) = app();
    let response = app
        .oneshot(uninstall_request(None, Some(webhook_hmac())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_uninstall_webhook_rejects_bad_hmac() {
    let (app, state) = app();
    store_token(&state).await;

    let response = app
        .oneshot(uninstall_request(Some(SHOP), Some("AAAA".to_string())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let status = state
        .flow()
        .check_connection_status(&ShopDomain::new(SHOP).unwrap())
        .await
        .unwrap();
    assert!(status.connected);
}

#[tokio::test]
async fn test_uninstall_webhook_deletes_token() {
    let (app, state) = app();
    store_token(&state).await;

    let response = app
        .oneshot(uninstall_request(Some(SHOP), Some(webhook_hmac())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = state
        .flow()
        .check_connection_status(&ShopDomain::new(SHOP).unwrap())
        .await
        .unwrap();
    assert!(!status.connected);
}

#[tokio::test]
async fn test_install_rejects_invalid_tenant_id() {
    let (app, _) = app();
    let query = signed_query(&[("shop", SHOP), ("timestamp", "1")]);
    let response = app
        .oneshot(
            Request::get(format!("/shopify/bad%20tenant/install?{query}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
