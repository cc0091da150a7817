use axum::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::config;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Shared-secret caller identity for the external cron trigger.
pub struct CronCaller;

#[async_trait]
impl<S> FromRequestParts<S> for CronCaller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or((StatusCode::UNAUTHORIZED, "Missing token".into()))?;
        if token != config::CRON_SECRET.as_str() {
            return Err((StatusCode::UNAUTHORIZED, "Invalid token".into()));
        }
        Ok(CronCaller)
    }
}

/// Shared-secret caller identity for the trusted transcription/chat
/// collaborators on `/api` routes.
pub struct ServiceCaller;

#[async_trait]
impl<S> FromRequestParts<S> for ServiceCaller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or((StatusCode::UNAUTHORIZED, "Missing token".into()))?;
        if token != config::SERVICE_API_TOKEN.as_str() {
            return Err((StatusCode::UNAUTHORIZED, "Invalid token".into()));
        }
        Ok(ServiceCaller)
    }
}
