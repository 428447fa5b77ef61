//! Shopify tenant OAuth connector.
//!
//! Loads [`AppConfig`] from the environment (and `.env`), starts the nonce
//! sweeper and serves the OAuth routes until SIGINT or SIGTERM.
//!
//! Logging is controlled by `RUST_LOG`; set `LOG_FORMAT=json` for JSON
//! lines.

use shopify_tenant_oauth::server::{router, AppState};
use shopify_tenant_oauth::{AppConfig, NonceSweeper, OAuthFlow};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopify_tenant_oauth=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::from_env()?;
    init_tracing();

    let addr = config.bind_addr();
    let sweep_interval = config.sweep_interval();
    let flow = OAuthFlow::from_config(config)?;

    let sweeper = NonceSweeper::new(Arc::clone(flow.tenants()), sweep_interval).spawn();
    tracing::info!(interval_secs = sweep_interval.as_secs(), "Nonce sweeper started");

    let app = router(AppState::new(flow));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}
