use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config;
use crate::error::AppResult;

/// Best-effort delivery of a message to a user-identified endpoint.
/// Callers log failures and move on; delivery is never transactional with
/// account-state mutation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> AppResult<()>;
}

/// key: notifier-http -> chat delivery endpoint
pub struct HttpNotifier {
    base: String,
    token: String,
    client: Client,
}

impl HttpNotifier {
    pub fn from_env() -> Option<Self> {
        let base = config::NOTIFIER_BASE_URL.clone()?;
        let token = config::NOTIFIER_TOKEN.clone()?;
        Some(Self::new(base, token))
    }

    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("client build"),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, user_id: &str, text: &str) -> AppResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.base, self.token);
        self.client
            .post(&url)
            .json(&json!({ "chat_id": user_id, "text": text }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
