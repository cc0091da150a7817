use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config;
use crate::error::{AppError, AppResult};

/// key: billing-provider -> one-shot portal API client
pub struct ProviderClient {
    base: String,
    api_key: String,
    client: Client,
}

impl ProviderClient {
    pub fn from_env() -> Option<Self> {
        let api_key = config::BILLING_API_KEY.clone()?;
        Some(Self::new(config::BILLING_API_BASE_URL.clone(), api_key))
    }

    pub fn new(base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("client build"),
        }
    }

    /// Creates a customer-portal session for a linked billing customer and
    /// returns its URL.
    pub async fn portal_session_url(&self, customer_ref: &str) -> AppResult<String> {
        let url = format!("{}/v1/billing_portal/sessions", self.base);
        let mut form = vec![("customer", customer_ref.to_string())];
        if let Some(return_url) = config::BILLING_PORTAL_RETURN_URL.clone() {
            form.push(("return_url", return_url));
        }
        let response: Value = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::Message("portal session response missing url".into()))
    }
}
