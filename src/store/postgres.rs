use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{Account, AccountPatch, PendingItem, PlanTier};

use super::{encode_tokens, parse_tokens, Store};

/// key: account-store-postgres -> production backend
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Ordered add-column migrations applied after the base table exists.
/// Postgres supports `IF NOT EXISTS` natively, so re-running is a no-op.
const ACCOUNT_COLUMNS: &[(&str, &str)] = &[
    ("billing_customer_ref", "TEXT"),
    ("integration_tokens", "TEXT NOT NULL DEFAULT '{}'"),
    ("digest_time", "TEXT NOT NULL DEFAULT '18:00'"),
    ("timezone", "TEXT NOT NULL DEFAULT 'UTC'"),
];

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                plan TEXT NOT NULL DEFAULT 'free',
                usage_minutes DOUBLE PRECISION NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, definition) in ACCOUNT_COLUMNS {
            let statement =
                format!("ALTER TABLE accounts ADD COLUMN IF NOT EXISTS {name} {definition}");
            sqlx::query(&statement).execute(&self.pool).await?;
        }

        // At most one account per billing customer.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS accounts_billing_customer_ref_key
            ON accounts (billing_customer_ref)
            WHERE billing_customer_ref IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_items (
                id BIGSERIAL PRIMARY KEY,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                sent BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS pending_items_owner_unsent_idx
            ON pending_items (owner_id)
            WHERE NOT sent
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Account {
    let plan: String = row.get("plan");
    let tokens: String = row.get("integration_tokens");
    Account {
        user_id: row.get("user_id"),
        plan: PlanTier::from_str_lossy(&plan),
        usage_minutes: row.get("usage_minutes"),
        billing_customer_ref: row.get("billing_customer_ref"),
        integration_tokens: parse_tokens(&tokens),
        digest_time: row.get("digest_time"),
        timezone: row.get("timezone"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_item(row: &sqlx::postgres::PgRow) -> PendingItem {
    PendingItem {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        sent: row.get("sent"),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_account(&self, user_id: &str) -> AppResult<Account> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO accounts (user_id, created_at, updated_at) VALUES ($1, $2, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row_to_account(&row))
    }

    async fn update_account(&self, user_id: &str, patch: AccountPatch) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                plan = COALESCE($2, plan),
                billing_customer_ref = COALESCE($3, billing_customer_ref),
                digest_time = COALESCE($4, digest_time),
                timezone = COALESCE($5, timezone),
                updated_at = $6
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(patch.plan.map(|p| p.as_str()))
        .bind(patch.billing_customer_ref)
        .bind(patch.digest_time)
        .bind(patch.timezone)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_integration_token(
        &self,
        user_id: &str,
        sink: &str,
        token: &str,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT integration_tokens FROM accounts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut tx)
            .await?;
        let Some(row) = row else {
            return Err(AppError::NotFound);
        };
        let raw: String = row.get("integration_tokens");
        let mut tokens = parse_tokens(&raw);
        tokens.insert(sink.to_string(), token.to_string());
        sqlx::query(
            "UPDATE accounts SET integration_tokens = $2, updated_at = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(encode_tokens(&tokens))
        .bind(Utc::now())
        .execute(&mut tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_billing_ref(&self, customer_ref: &str) -> AppResult<Option<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE billing_customer_ref = $1")
            .bind(customer_ref)
            .fetch_all(&self.pool)
            .await?;
        if rows.len() > 1 {
            return Err(AppError::Message(format!(
                "invariant violated: {} accounts share billing ref {customer_ref}",
                rows.len()
            )));
        }
        Ok(rows.first().map(row_to_account))
    }

    async fn list_accounts(&self) -> AppResult<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_account).collect())
    }

    async fn reserve_usage(
        &self,
        user_id: &str,
        proposed: f64,
        limit: f64,
    ) -> AppResult<Option<f64>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET usage_minutes = usage_minutes + $2, updated_at = $3
            WHERE user_id = $1 AND usage_minutes + $2 <= $4
            RETURNING usage_minutes
            "#,
        )
        .bind(user_id)
        .bind(proposed)
        .bind(Utc::now())
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("usage_minutes")))
    }

    async fn add_pending_item(&self, owner_id: &str, content: &str) -> AppResult<i64> {
        let row = sqlx::query(
            "INSERT INTO pending_items (owner_id, content, created_at) VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(owner_id)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn unsent_items(&self, owner_id: &str) -> AppResult<Vec<PendingItem>> {
        let rows = sqlx::query(
            "SELECT * FROM pending_items WHERE owner_id = $1 AND NOT sent ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn mark_items_sent(&self, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE pending_items SET sent = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
