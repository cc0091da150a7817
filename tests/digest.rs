use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

use voxtask::digest;
use voxtask::models::AccountPatch;
use voxtask::store::Store;

mod common;

async fn seed_account(store: &Arc<dyn Store>, user_id: &str, digest_time: &str, timezone: &str) {
    store.get_or_create_account(user_id).await.unwrap();
    store
        .update_account(
            user_id,
            AccountPatch {
                digest_time: Some(digest_time.into()),
                timezone: Some(timezone.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_fires_only_in_matching_local_minute() {
    common::set_test_env();
    let (_guard, store) = common::sqlite_store().await;
    let notifier = common::RecordingNotifier::new();

    // 10:00 UTC is 18:00 in Singapore.
    seed_account(&store, "sg", "18:00", "Asia/Singapore").await;
    seed_account(&store, "london", "18:00", "Europe/London").await;
    store.add_pending_item("sg", "Buy groceries").await.unwrap();
    store.add_pending_item("sg", "Call the plumber").await.unwrap();
    store.add_pending_item("london", "File expenses").await.unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    let summary = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();

    assert_eq!(summary.accounts_scanned, 2);
    assert_eq!(summary.digests_sent, 1);
    assert_eq!(summary.items_flushed, 2);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "sg");
    assert!(sent[0].1.contains("Buy groceries"));
    assert!(sent[0].1.contains("Call the plumber"));

    // The non-matching account keeps its item for its own minute.
    assert_eq!(store.unsent_items("london").await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_sweep_in_same_minute_is_a_no_op() {
    common::set_test_env();
    let (_guard, store) = common::sqlite_store().await;
    let notifier = common::RecordingNotifier::new();

    seed_account(&store, "u1", "10:00", "UTC").await;
    store.add_pending_item("u1", "One thing").await.unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    let first = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();
    assert_eq!(first.digests_sent, 1);

    let second = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();
    assert_eq!(second.digests_sent, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn empty_queue_sends_nothing() {
    common::set_test_env();
    let (_guard, store) = common::sqlite_store().await;
    let notifier = common::RecordingNotifier::new();

    seed_account(&store, "u1", "10:00", "UTC").await;

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    let summary = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();
    assert_eq!(summary.digests_sent, 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn delivery_failure_keeps_items_unsent() {
    common::set_test_env();
    let (_guard, store) = common::sqlite_store().await;
    let notifier = common::RecordingNotifier::new();

    seed_account(&store, "u1", "10:00", "UTC").await;
    store.add_pending_item("u1", "Important task").await.unwrap();

    notifier.set_failing(true);
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    let summary = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();
    assert_eq!(summary.digests_sent, 0);
    assert_eq!(store.unsent_items("u1").await.unwrap().len(), 1);

    // Recovery: the next matching sweep delivers the held items.
    notifier.set_failing(false);
    let summary = digest::run_sweep(store.as_ref(), notifier.as_ref(), now)
        .await
        .unwrap();
    assert_eq!(summary.digests_sent, 1);
    assert!(store.unsent_items("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn cron_endpoint_requires_bearer_secret() {
    common::set_test_env();
    let (_guard, store) = common::sqlite_store().await;
    let app = common::app(store, common::RecordingNotifier::new());

    let request = Request::builder()
        .method("POST")
        .uri("/cron/digest")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/cron/digest")
        .header("authorization", format!("Bearer {}", common::CRON_SECRET))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
