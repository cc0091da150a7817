use serde::Serialize;

use crate::error::AppResult;
use crate::models::Account;
use crate::store::Store;

/// key: usage-meter -> quota decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UsageDecision {
    Accepted { new_total: f64 },
    Rejected { remaining: f64 },
}

/// Rejects when `current + proposed` would exceed the plan limit, otherwise
/// commits the consumption and returns the new total. The check and the
/// commit are one conditional update in the store, so two concurrent calls
/// cannot both pass on a stale reading. The caller supplies the account it
/// already holds; the decision is made under that account's plan limit.
pub async fn check_and_reserve(
    store: &dyn Store,
    account: &Account,
    proposed_minutes: f64,
) -> AppResult<UsageDecision> {
    let limit = account.limit_minutes();

    match store
        .reserve_usage(&account.user_id, proposed_minutes, limit)
        .await?
    {
        Some(new_total) => Ok(UsageDecision::Accepted { new_total }),
        None => {
            // The pre-read is only used for the rejection message; the
            // authoritative check happened inside the conditional update.
            let remaining = (limit - account.usage_minutes).max(0.0);
            Ok(UsageDecision::Rejected { remaining })
        }
    }
}
