use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::extractor::ServiceCaller;
use crate::meter::{self, UsageDecision};
use crate::models::PlanTier;
use crate::provider::ProviderClient;
use crate::store::Store;

#[derive(Deserialize)]
pub struct ConsumeRequest {
    pub account_id: String,
    pub minutes: f64,
    pub content: String,
}

#[derive(Serialize)]
pub struct ConsumeResponse {
    pub accepted: bool,
    pub new_total: Option<f64>,
    pub remaining: Option<f64>,
    pub limit_minutes: f64,
    pub plan: PlanTier,
}

/// Consumption intake from the transcription collaborator: meter the
/// proposed minutes and, on accept, park the produced content for the
/// daily digest.
pub async fn consume(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Json(payload): Json<ConsumeRequest>,
) -> AppResult<Json<ConsumeResponse>> {
    if payload.account_id.trim().is_empty() {
        return Err(AppError::BadRequest("account_id is required".into()));
    }
    if !payload.minutes.is_finite() || payload.minutes < 0.0 {
        return Err(AppError::BadRequest(
            "minutes must be a non-negative number".into(),
        ));
    }

    // One read: the response echoes the plan and limit the decision was
    // made under.
    let account = store.get_or_create_account(&payload.account_id).await?;
    let decision = meter::check_and_reserve(store.as_ref(), &account, payload.minutes).await?;

    let response = match decision {
        UsageDecision::Accepted { new_total } => {
            if !payload.content.trim().is_empty() {
                store
                    .add_pending_item(&payload.account_id, &payload.content)
                    .await?;
            }
            info!(account_id = %payload.account_id, minutes = payload.minutes, "usage reserved");
            ConsumeResponse {
                accepted: true,
                new_total: Some(new_total),
                remaining: None,
                limit_minutes: account.limit_minutes(),
                plan: account.plan,
            }
        }
        UsageDecision::Rejected { remaining } => ConsumeResponse {
            accepted: false,
            new_total: None,
            remaining: Some(remaining),
            limit_minutes: account.limit_minutes(),
            plan: account.plan,
        },
    };
    Ok(Json(response))
}

#[derive(Serialize)]
pub struct AccountView {
    pub user_id: String,
    pub plan: PlanTier,
    pub usage_minutes: f64,
    pub limit_minutes: f64,
    pub digest_time: String,
    pub timezone: String,
    /// Configured sink names only; credentials never leave the store.
    pub integrations: Vec<String>,
}

pub async fn get_account(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Path(id): Path<String>,
) -> AppResult<Json<AccountView>> {
    let account = store.get_or_create_account(&id).await?;
    Ok(Json(AccountView {
        limit_minutes: account.limit_minutes(),
        integrations: account.integration_tokens.keys().cloned().collect(),
        user_id: account.user_id,
        plan: account.plan,
        usage_minutes: account.usage_minutes,
        digest_time: account.digest_time,
        timezone: account.timezone,
    }))
}

#[derive(Deserialize)]
pub struct SetDigestTimeRequest {
    pub time: String,
}

pub async fn set_digest_time(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Path(id): Path<String>,
    Json(payload): Json<SetDigestTimeRequest>,
) -> AppResult<StatusCode> {
    let Some(canonical) = canonical_digest_time(&payload.time) else {
        return Err(AppError::BadRequest(
            "Invalid time format. Use HH:MM (24-hour), e.g. 18:00".into(),
        ));
    };
    store.get_or_create_account(&id).await?;
    store
        .update_account(
            &id,
            crate::models::AccountPatch {
                digest_time: Some(canonical),
                ..Default::default()
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SetTimezoneRequest {
    pub timezone: String,
}

pub async fn set_timezone(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Path(id): Path<String>,
    Json(payload): Json<SetTimezoneRequest>,
) -> AppResult<StatusCode> {
    let Some(canonical) = canonical_timezone(&payload.timezone) else {
        return Err(AppError::BadRequest(
            "Invalid timezone. Use an IANA name such as Asia/Singapore".into(),
        ));
    };
    store.get_or_create_account(&id).await?;
    store
        .update_account(
            &id,
            crate::models::AccountPatch {
                timezone: Some(canonical),
                ..Default::default()
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SetIntegrationRequest {
    pub token: String,
}

pub async fn set_integration_token(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Path((id, sink)): Path<(String, String)>,
    Json(payload): Json<SetIntegrationRequest>,
) -> AppResult<StatusCode> {
    if payload.token.trim().is_empty() {
        return Err(AppError::BadRequest("token is required".into()));
    }
    store.get_or_create_account(&id).await?;
    store
        .set_integration_token(&id, &sink, payload.token.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct PortalLink {
    pub url: String,
}

/// Subscription management entrypoint: a portal session for linked billing
/// customers, the tagged checkout link for everyone else.
pub async fn portal_link(
    _caller: ServiceCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Path(id): Path<String>,
) -> AppResult<Json<PortalLink>> {
    let account = store.get_or_create_account(&id).await?;

    if let Some(customer_ref) = account.billing_customer_ref.as_deref() {
        let client = ProviderClient::from_env()
            .ok_or_else(|| AppError::Message("billing provider is not configured".into()))?;
        let url = client.portal_session_url(customer_ref).await?;
        return Ok(Json(PortalLink { url }));
    }

    let link = config::BILLING_PAYMENT_LINK
        .clone()
        .ok_or_else(|| AppError::Message("no payment link configured".into()))?;
    Ok(Json(PortalLink {
        url: format!("{link}?client_reference_id={}", account.user_id),
    }))
}

fn canonical_digest_time(raw: &str) -> Option<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .ok()
        .map(|t| t.format("%H:%M").to_string())
}

fn canonical_timezone(raw: &str) -> Option<String> {
    Tz::from_str(raw.trim()).ok().map(|tz| tz.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_time_canonicalized() {
        assert_eq!(canonical_digest_time("18:00").as_deref(), Some("18:00"));
        assert_eq!(canonical_digest_time("7:05").as_deref(), Some("07:05"));
        assert_eq!(canonical_digest_time(" 09:30 ").as_deref(), Some("09:30"));
    }

    #[test]
    fn bad_digest_time_rejected() {
        assert_eq!(canonical_digest_time("25:99"), None);
        assert_eq!(canonical_digest_time("18:00:30"), None);
        assert_eq!(canonical_digest_time("six pm"), None);
    }

    #[test]
    fn timezone_validation() {
        assert_eq!(
            canonical_timezone("Asia/Singapore").as_deref(),
            Some("Asia/Singapore")
        );
        assert_eq!(canonical_timezone("UTC").as_deref(), Some("UTC"));
        assert_eq!(canonical_timezone("Not/AZone"), None);
    }
}
