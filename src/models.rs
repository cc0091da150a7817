use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// key: entitlement-models -> accounts,plans,pending-items

/// Minutes of audio a FREE account may consume.
pub const FREE_TIER_MINUTES: f64 = 5.0;
/// Minutes of audio a PRO account may consume.
pub const PRO_TIER_MINUTES: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }

    /// Unknown stored values fall back to FREE rather than failing a read.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "pro" => PlanTier::Pro,
            _ => PlanTier::Free,
        }
    }

    pub fn limit_minutes(&self) -> f64 {
        match self {
            PlanTier::Free => FREE_TIER_MINUTES,
            PlanTier::Pro => PRO_TIER_MINUTES,
        }
    }
}

/// Per-user entitlement and preference record. Created lazily with defaults
/// on first interaction; never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub plan: PlanTier,
    pub usage_minutes: f64,
    pub billing_customer_ref: Option<String>,
    pub integration_tokens: BTreeMap<String, String>,
    pub digest_time: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn limit_minutes(&self) -> f64 {
        self.plan.limit_minutes()
    }
}

/// Partial account update. `None` fields are left untouched.
/// `billing_customer_ref` is only ever set, never cleared.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub plan: Option<PlanTier>,
    pub billing_customer_ref: Option<String>,
    pub digest_time: Option<String>,
    pub timezone: Option<String>,
}

/// A unit of generated content awaiting digest delivery. `sent` is flipped
/// exactly once by the digest sweep and never reverted.
#[derive(Debug, Clone, Serialize)]
pub struct PendingItem {
    pub id: i64,
    pub owner_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sent: bool,
}
