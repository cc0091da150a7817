use sqlx::PgPool;

use voxtask::models::{AccountPatch, PlanTier};
use voxtask::store::postgres::PgStore;
use voxtask::store::Store;

// These run against a real server via `cargo test -- --ignored` with
// DATABASE_URL pointing at Postgres.

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn migrations_are_idempotent(pool: PgPool) {
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    store.migrate().await.unwrap();

    let account = store.get_or_create_account("u1").await.unwrap();
    assert_eq!(account.plan, PlanTier::Free);
    assert_eq!(account.digest_time, "18:00");
    assert_eq!(account.timezone, "UTC");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn billing_ref_is_unique_across_accounts(pool: PgPool) {
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();

    store.get_or_create_account("u1").await.unwrap();
    store.get_or_create_account("u2").await.unwrap();
    store
        .update_account(
            "u1",
            AccountPatch {
                billing_customer_ref: Some("cus_1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = store
        .update_account(
            "u2",
            AccountPatch {
                billing_customer_ref: Some("cus_1".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(result.is_err());

    let found = store.find_by_billing_ref("cus_1").await.unwrap().unwrap();
    assert_eq!(found.user_id, "u1");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn reserve_usage_is_conditional(pool: PgPool) {
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    store.get_or_create_account("u1").await.unwrap();

    assert_eq!(
        store.reserve_usage("u1", 4.0, 5.0).await.unwrap(),
        Some(4.0)
    );
    assert_eq!(store.reserve_usage("u1", 2.0, 5.0).await.unwrap(), None);
    assert_eq!(
        store.reserve_usage("u1", 1.0, 5.0).await.unwrap(),
        Some(5.0)
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn pending_items_flow(pool: PgPool) {
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    store.get_or_create_account("u1").await.unwrap();

    let a = store.add_pending_item("u1", "first").await.unwrap();
    let b = store.add_pending_item("u1", "second").await.unwrap();

    let unsent = store.unsent_items("u1").await.unwrap();
    assert_eq!(unsent.len(), 2);
    assert_eq!(unsent[0].content, "first");

    store.mark_items_sent(&[a, b]).await.unwrap();
    assert!(store.unsent_items("u1").await.unwrap().is_empty());
}
