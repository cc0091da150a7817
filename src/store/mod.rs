use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::models::{Account, AccountPatch, PendingItem};

pub mod postgres;
pub mod sqlite;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// key: account-store -> single storage interface, two interchangeable backends
///
/// All mutation goes through single-statement writes so updates to one
/// account never block another. `reserve_usage` is the only compound
/// check-then-commit operation and it is expressed as one conditional
/// UPDATE, which closes the concurrent-quota race without locks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent: creates the account with default values when absent.
    async fn get_or_create_account(&self, user_id: &str) -> AppResult<Account>;

    /// Fails with `NotFound` when the account is absent; never auto-creates.
    async fn update_account(&self, user_id: &str, patch: AccountPatch) -> AppResult<()>;

    async fn set_integration_token(&self, user_id: &str, sink: &str, token: &str)
        -> AppResult<()>;

    /// Fails loudly if more than one account shares the ref.
    async fn find_by_billing_ref(&self, customer_ref: &str) -> AppResult<Option<Account>>;

    /// Snapshot of every account, used only by the digest sweep.
    async fn list_accounts(&self) -> AppResult<Vec<Account>>;

    /// Atomically adds `proposed` minutes when `current + proposed <= limit`.
    /// Returns the new total on success, `None` when the quota would be
    /// exceeded or the account row is absent; callers create the account
    /// before reserving.
    async fn reserve_usage(&self, user_id: &str, proposed: f64, limit: f64)
        -> AppResult<Option<f64>>;

    async fn add_pending_item(&self, owner_id: &str, content: &str) -> AppResult<i64>;

    async fn unsent_items(&self, owner_id: &str) -> AppResult<Vec<PendingItem>>;

    /// Flips `sent` to true; never reverted afterwards.
    async fn mark_items_sent(&self, ids: &[i64]) -> AppResult<()>;
}

/// Backend selection happens once at startup from the URL scheme.
pub async fn connect(database_url: &str) -> AppResult<Arc<dyn Store>> {
    if database_url.starts_with("postgres") {
        Ok(Arc::new(PgStore::connect(database_url).await?))
    } else if database_url.starts_with("sqlite") {
        Ok(Arc::new(SqliteStore::connect(database_url).await?))
    } else {
        Err(AppError::Message(format!(
            "unsupported DATABASE_URL scheme: {database_url}"
        )))
    }
}

pub(crate) fn parse_tokens(raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn encode_tokens(tokens: &BTreeMap<String, String>) -> String {
    serde_json::to_string(tokens).unwrap_or_else(|_| "{}".to_string())
}
