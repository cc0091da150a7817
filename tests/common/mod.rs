#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{routing::get, Extension, Router};
use tempfile::TempDir;

use voxtask::error::{AppError, AppResult};
use voxtask::notifier::Notifier;
use voxtask::routes::api_routes;
use voxtask::store::{self, Store};

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const CRON_SECRET: &str = "cron-test-secret";
pub const SERVICE_TOKEN: &str = "service-test-token";

/// Shared secrets are process-wide Lazy statics; every test sets the same
/// values so ordering between tests does not matter.
pub fn set_test_env() {
    std::env::set_var("BILLING_WEBHOOK_SECRET", WEBHOOK_SECRET);
    std::env::set_var("CRON_SECRET", CRON_SECRET);
    std::env::set_var("SERVICE_API_TOKEN", SERVICE_TOKEN);
}

/// File-backed SQLite store in a temp dir; the guard must outlive the store.
pub async fn sqlite_store() -> (TempDir, Arc<dyn Store>) {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("voxtask-test.db").display());
    let store = store::connect(&url).await.expect("sqlite store");
    (dir, store)
}

/// Records every delivered message; flips to failing mode on demand to
/// exercise the items-stay-unsent path.
pub struct RecordingNotifier {
    failing: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: &str, text: &str) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Message("notifier down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}

async fn root() -> &'static str {
    "Voxtask API"
}

pub fn app(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(api_routes())
        .layer(Extension(store))
        .layer(Extension(notifier))
}
