use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::{AccountPatch, PlanTier, FREE_TIER_MINUTES, PRO_TIER_MINUTES};
use crate::notifier::Notifier;
use crate::store::Store;

/// key: entitlement -> provider lifecycle events
///
/// Transient, never persisted. Transitions set absolute state, so
/// re-delivery of the same event is a natural no-op.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    CheckoutCompleted {
        customer_ref: Option<String>,
        client_ref: Option<String>,
    },
    SubscriptionDeleted {
        customer_ref: String,
    },
    SubscriptionUpdated {
        customer_ref: String,
        cancel_at_period_end: bool,
        cancel_at: Option<i64>,
        current_period_end: Option<i64>,
        previous_attributes: Map<String, Value>,
    },
}

impl BillingEvent {
    /// Parses the provider envelope `{"type", "data": {"object",
    /// "previous_attributes"}}`. Unknown types and recognized types with
    /// missing required fields come back as `None`; the caller logs and
    /// moves on.
    pub fn from_envelope(envelope: &Value) -> Option<Self> {
        let kind = envelope.get("type")?.as_str()?;
        let data = envelope.get("data")?;
        let object = data.get("object")?;
        match kind {
            "checkout.session.completed" => Some(BillingEvent::CheckoutCompleted {
                customer_ref: string_field(object, "customer"),
                client_ref: string_field(object, "client_reference_id"),
            }),
            "customer.subscription.deleted" => Some(BillingEvent::SubscriptionDeleted {
                customer_ref: string_field(object, "customer")?,
            }),
            "customer.subscription.updated" => Some(BillingEvent::SubscriptionUpdated {
                customer_ref: string_field(object, "customer")?,
                cancel_at_period_end: object
                    .get("cancel_at_period_end")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                cancel_at: object.get("cancel_at").and_then(Value::as_i64),
                current_period_end: object.get("current_period_end").and_then(Value::as_i64),
                previous_attributes: data
                    .get("previous_attributes")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

fn string_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// What a delivered event did, surfaced for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Upgraded { user_id: String },
    Downgraded { user_id: String },
    CancellationScheduled { user_id: String },
    Ignored(&'static str),
}

/// Applies one provider event: mutates plan state in the store, then fires
/// the user-facing notice. Notification failure is logged and never rolls
/// back the committed state change.
pub async fn apply_event(
    store: &dyn Store,
    notifier: &dyn Notifier,
    event: BillingEvent,
) -> AppResult<EventOutcome> {
    match event {
        BillingEvent::CheckoutCompleted {
            customer_ref,
            client_ref,
        } => {
            let Some(user_id) = client_ref else {
                warn!("checkout completed without client_reference_id");
                return Ok(EventOutcome::Ignored("checkout missing client_ref"));
            };
            // The client_ref originated from our own checkout link, so the
            // account is created if this is its first interaction.
            store.get_or_create_account(&user_id).await?;
            store
                .update_account(
                    &user_id,
                    AccountPatch {
                        plan: Some(PlanTier::Pro),
                        billing_customer_ref: customer_ref,
                        ..Default::default()
                    },
                )
                .await?;
            info!(%user_id, "account upgraded to pro");
            deliver(
                notifier,
                &user_id,
                &format!(
                    "Your Pro plan is active: {PRO_TIER_MINUTES:.0} minutes per month, \
                     daily digest, and task sync. Configure features in settings."
                ),
            )
            .await;
            Ok(EventOutcome::Upgraded { user_id })
        }
        BillingEvent::SubscriptionDeleted { customer_ref } => {
            let Some(account) = lookup(store, &customer_ref).await? else {
                return Ok(EventOutcome::Ignored("no account for billing ref"));
            };
            store
                .update_account(
                    &account.user_id,
                    AccountPatch {
                        plan: Some(PlanTier::Free),
                        ..Default::default()
                    },
                )
                .await?;
            info!(user_id = %account.user_id, "account downgraded to free");
            deliver(
                notifier,
                &account.user_id,
                &format!(
                    "Your subscription has ended. You are back on the free tier \
                     ({FREE_TIER_MINUTES:.0} minutes)."
                ),
            )
            .await;
            Ok(EventOutcome::Downgraded {
                user_id: account.user_id,
            })
        }
        BillingEvent::SubscriptionUpdated {
            customer_ref,
            cancel_at_period_end,
            cancel_at,
            current_period_end,
            previous_attributes,
        } => {
            let Some(end_phrase) = cancellation_notice(
                cancel_at_period_end,
                cancel_at,
                current_period_end,
                &previous_attributes,
            ) else {
                return Ok(EventOutcome::Ignored("no cancellation transition"));
            };
            let Some(account) = lookup(store, &customer_ref).await? else {
                return Ok(EventOutcome::Ignored("no account for billing ref"));
            };
            // Plan stays PRO until the period actually ends; the deletion
            // event performs the downgrade.
            info!(user_id = %account.user_id, "subscription cancellation scheduled");
            deliver(
                notifier,
                &account.user_id,
                &format!(
                    "Subscription cancellation scheduled. Your Pro access remains \
                     until {end_phrase}, after which you move to the free tier."
                ),
            )
            .await;
            Ok(EventOutcome::CancellationScheduled {
                user_id: account.user_id,
            })
        }
    }
}

/// Diff-based suppression: a cancellation notice fires only when the flag
/// that is truthy now is also a key of `previous_attributes`, i.e. this
/// event is the one that flipped it. Checking only the current value would
/// re-notify on every unrelated update to a cancelling subscription.
/// Returns the end-date phrase for the notice, preferring the explicit
/// `cancel_at` timestamp over `current_period_end`.
fn cancellation_notice(
    cancel_at_period_end: bool,
    cancel_at: Option<i64>,
    current_period_end: Option<i64>,
    previous_attributes: &Map<String, Value>,
) -> Option<String> {
    let flag_flipped =
        previous_attributes.contains_key("cancel_at_period_end") && cancel_at_period_end;
    let date_flipped = previous_attributes.contains_key("cancel_at") && cancel_at.is_some();
    if !flag_flipped && !date_flipped {
        return None;
    }

    let end_ts = cancel_at.or(current_period_end);
    Some(match end_ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single()) {
        Some(end) => end.format("%Y-%m-%d").to_string(),
        None => "the end of the billing period".to_string(),
    })
}

async fn lookup(
    store: &dyn Store,
    customer_ref: &str,
) -> AppResult<Option<crate::models::Account>> {
    let found = store.find_by_billing_ref(customer_ref).await?;
    if found.is_none() {
        warn!(%customer_ref, "no account found for billing customer");
    }
    Ok(found)
}

async fn deliver(notifier: &dyn Notifier, user_id: &str, text: &str) {
    if let Err(err) = notifier.send(user_id, text).await {
        warn!(?err, %user_id, "failed to deliver entitlement notice");
    }
}
