use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{accounts, digest, webhook};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/consume", post(accounts::consume))
        .route("/api/accounts/:id", get(accounts::get_account))
        .route("/api/accounts/:id/digest-time", put(accounts::set_digest_time))
        .route("/api/accounts/:id/timezone", put(accounts::set_timezone))
        .route(
            "/api/accounts/:id/integrations/:sink",
            put(accounts::set_integration_token),
        )
        .route("/api/accounts/:id/portal", get(accounts::portal_link))
        .route("/webhook/billing", post(webhook::billing_webhook))
        .route("/cron/digest", post(digest::cron_digest))
}
