use std::str::FromStr;
use std::sync::Arc;

use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{error, info, warn};

use crate::config;
use crate::error::AppResult;
use crate::extractor::CronCaller;
use crate::models::PendingItem;
use crate::notifier::Notifier;
use crate::store::Store;

/// key: digest-scheduler -> timezone-aware daily flush
pub fn spawn(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) {
    let interval = TokioDuration::from_secs(*config::DIGEST_SCAN_INTERVAL_SECS);
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match run_sweep(store.as_ref(), notifier.as_ref(), now).await {
                Ok(summary) if summary.digests_sent > 0 => {
                    info!(
                        digests_sent = summary.digests_sent,
                        items_flushed = summary.items_flushed,
                        "digest sweep delivered"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(?err, "digest sweep tick failed"),
            }
        }
    });
}

#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub accounts_scanned: usize,
    pub digests_sent: usize,
    pub items_flushed: usize,
}

/// key: digest-scheduler -> sweep
///
/// One reference instant for the whole sweep. An account fires when that
/// instant, rendered in the account's zone, equals its `HH:MM` target
/// exactly. The sent-marker flip is the only source of truth for "already
/// delivered": a second sweep in the same minute finds nothing unsent and
/// is a no-op. Callable from the interval loop above and from the
/// authenticated cron endpoint; both go through this function.
pub async fn run_sweep(
    store: &dyn Store,
    notifier: &dyn Notifier,
    now: DateTime<Utc>,
) -> AppResult<SweepSummary> {
    let accounts = store.list_accounts().await?;
    let mut summary = SweepSummary {
        accounts_scanned: accounts.len(),
        ..Default::default()
    };

    for account in &accounts {
        if local_minute(now, &account.timezone) != account.digest_time {
            continue;
        }
        let items = match store.unsent_items(&account.user_id).await {
            Ok(items) => items,
            Err(err) => {
                warn!(?err, user_id = %account.user_id, "failed to load pending items");
                continue;
            }
        };
        if items.is_empty() {
            continue;
        }

        let body = render_digest(&items, *config::DIGEST_PREVIEW_CHARS);
        if let Err(err) = notifier.send(&account.user_id, &body).await {
            // Items stay unsent; redelivery happens the next time the
            // account's minute matches (effectively the next day).
            warn!(?err, user_id = %account.user_id, "failed to deliver digest");
            continue;
        }

        let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        if let Err(err) = store.mark_items_sent(&ids).await {
            // Delivered but not marked: the next matching minute redelivers.
            // At-least-once is acceptable here.
            error!(?err, user_id = %account.user_id, "failed to mark digest items sent");
            continue;
        }
        summary.digests_sent += 1;
        summary.items_flushed += ids.len();
    }

    Ok(summary)
}

/// The reference instant rendered as `HH:MM` in the given IANA zone.
/// Invalid stored zones fall back to UTC rather than wedging the sweep.
fn local_minute(now: DateTime<Utc>, zone: &str) -> String {
    match Tz::from_str(zone) {
        Ok(tz) => now.with_timezone(&tz).format("%H:%M").to_string(),
        Err(_) => {
            warn!(%zone, "invalid stored timezone, treating as UTC");
            now.format("%H:%M").to_string()
        }
    }
}

fn render_digest(items: &[PendingItem], preview_chars: usize) -> String {
    let mut body = String::from("Your daily digest\n\n");
    for item in items {
        body.push_str("• ");
        body.push_str(preview(&item.content, preview_chars));
        if item.content.chars().count() > preview_chars {
            body.push_str("...");
        }
        body.push('\n');
    }
    body.push_str("\nCheck your task manager for details.");
    body
}

fn preview(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Externally triggered sweep, bearer-authenticated via `CronCaller`.
pub async fn cron_digest(
    _caller: CronCaller,
    Extension(store): Extension<Arc<dyn Store>>,
    Extension(notifier): Extension<Arc<dyn Notifier>>,
) -> AppResult<Json<SweepSummary>> {
    let summary = run_sweep(store.as_ref(), notifier.as_ref(), Utc::now()).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_instant_renders_in_account_zone() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(local_minute(now, "Asia/Singapore"), "18:00");
        assert_eq!(local_minute(now, "UTC"), "10:00");
    }

    #[test]
    fn invalid_zone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(local_minute(now, "Not/AZone"), "10:00");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 100), "short");
    }

    #[test]
    fn digest_truncates_long_items() {
        let items = vec![PendingItem {
            id: 1,
            owner_id: "u".into(),
            content: "a".repeat(150),
            created_at: Utc::now(),
            sent: false,
        }];
        let body = render_digest(&items, 100);
        assert!(body.contains(&format!("• {}...", "a".repeat(100))));
    }
}
