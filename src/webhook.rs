use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::config;
use crate::entitlement::{self, BillingEvent};
use crate::error::{AppError, AppResult};
use crate::notifier::Notifier;
use crate::store::Store;

/// key: webhook-billing -> signed provider intake
///
/// Signature failures reject before any parsing; after dispatch the
/// response is 200 even for internal no-ops so the provider does not
/// retry deliveries we have consciously ignored. Only store-level
/// failures surface as 5xx, which the provider will retry.
pub async fn billing_webhook(
    Extension(store): Extension<Arc<dyn Store>>,
    Extension(notifier): Extension<Arc<dyn Notifier>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    verify_signature(&headers, &body, config::BILLING_WEBHOOK_SECRET.as_bytes())?;

    let envelope: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid payload".into()))?;

    let Some(event) = BillingEvent::from_envelope(&envelope) else {
        // Unknown type or a recognized type with missing fields.
        warn!(
            event_type = envelope.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
            "ignoring billing event"
        );
        return Ok(StatusCode::OK);
    };

    match entitlement::apply_event(store.as_ref(), notifier.as_ref(), event).await {
        Ok(outcome) => {
            info!(?outcome, "billing event applied");
            Ok(StatusCode::OK)
        }
        Err(err) => {
            error!(?err, "failed to apply billing event");
            Err(err)
        }
    }
}

fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &[u8]) -> AppResult<()> {
    let sig_header = headers
        .get("x-billing-signature")
        .ok_or(AppError::BadRequest("Missing signature".into()))?;
    let sig = sig_header
        .to_str()
        .map_err(|_| AppError::BadRequest("Bad signature".into()))?;
    let expected = {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can use any key length");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    };
    if expected != sig {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Signature value for a payload, shared with tests and local tooling.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can use any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_verifies() {
        let secret = b"whsec_test";
        let body = br#"{"type":"checkout.session.completed"}"#;
        let sig = sign_payload(secret, body);
        let mut headers = HeaderMap::new();
        headers.insert("x-billing-signature", sig.parse().unwrap());
        assert!(verify_signature(&headers, body, secret).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let secret = b"whsec_test";
        let sig = sign_payload(secret, b"original");
        let mut headers = HeaderMap::new();
        headers.insert("x-billing-signature", sig.parse().unwrap());
        assert!(matches!(
            verify_signature(&headers, b"tampered", secret),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn missing_signature_is_bad_request() {
        let headers = HeaderMap::new();
        assert!(matches!(
            verify_signature(&headers, b"{}", b"whsec_test"),
            Err(AppError::BadRequest(_))
        ));
    }
}
