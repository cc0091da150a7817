use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use tracing_subscriber::{fmt, EnvFilter};

use voxtask::notifier::{HttpNotifier, Notifier};
use voxtask::routes::api_routes;
use voxtask::{config, digest, store};

async fn root() -> &'static str {
    "Voxtask API"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if shared secrets are missing
    let _ = config::BILLING_WEBHOOK_SECRET.as_str();
    let _ = config::CRON_SECRET.as_str();
    let _ = config::SERVICE_API_TOKEN.as_str();

    let db_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://voxtask.db".into());
    let store = store::connect(&db_url).await?;

    let notifier: Arc<dyn Notifier> = Arc::new(
        HttpNotifier::from_env()
            .context("NOTIFIER_BASE_URL and NOTIFIER_TOKEN must be set")?,
    );

    digest::spawn(store.clone(), notifier.clone());

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(store.clone()))
        .layer(Extension(notifier.clone()));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("invalid BIND_ADDRESS/BIND_PORT")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
