//! Backup engine unit tests.
//!
//! Tests for a single run driven to a terminal outcome:
//! - Fresh and incremental runs, reconciliation of removed products
//! - Pause at a page boundary and resume from the cursor
//! - Throttling, API failures and malformed payloads
//! - Storage quota exhaustion and transport errors

use serde_json::json;
use std::sync::Arc;

use catalog_backup_core::backup::{no_progress, PartialReason, RunControl, RunOutcome};
use catalog_backup_core::model::{BackupStatus, LogLevel};
use catalog_backup_core::notify::NotificationKind;
use catalog_backup_core::source::RawResponse;
use catalog_backup_core::store::{CatalogStore, MemoryCatalogStore};

use super::helpers::{key, pages, recording_progress, token, Harness, PagedSource, STOREFRONT};

fn six_products() -> PagedSource {
    PagedSource::new(pages(&[&["A", "B"], &["C", "D"], &["E", "F"]]))
}

// ============================================================================
// Natural completion
// ============================================================================

#[tokio::test]
async fn fresh_run_backs_up_every_page() {
    let harness = Harness::new(six_products());
    let control = RunControl::new(no_progress());
    let (progress, updates) = recording_progress();
    control.replace_progress(progress);

    let outcome = harness.engine.run(STOREFRONT, &control).await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 6,
            removed: 0
        }
    );
    assert_eq!(*updates.lock(), vec![(2, 6), (4, 6), (6, 6)]);

    let storefront = harness.storefront().await;
    assert_eq!(storefront.backup_status, BackupStatus::Complete);
    assert_eq!(storefront.product_count, 6);
    assert!(storefront.size_bytes > 0);
    assert!(storefront.last_backup_at.is_some());
    assert!(harness.cursor().await.is_none());

    let products = harness.products().await;
    assert_eq!(products.len(), 6);
    assert!(products.values().all(|p| p.removed_at.is_none()));
    assert_eq!(products["A"].id, key("A"));
    assert_eq!(products["A"].title.as_deref(), Some("Product A"));

    assert_eq!(
        harness.source.calls(),
        vec![None, Some(token(1)), Some(token(2))]
    );

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Completed { products: 6 });

    let messages = harness.log_messages().await;
    assert_eq!(messages.first().map(String::as_str), Some("Backup started"));
    assert!(messages.last().unwrap().starts_with("Backup complete"));
}

#[tokio::test]
async fn progress_estimate_is_zero_without_total() {
    let harness = Harness::new(six_products().without_total());
    let (progress, updates) = recording_progress();

    let outcome = harness
        .engine
        .run(STOREFRONT, &RunControl::new(progress))
        .await;

    assert!(outcome.is_completed());
    assert_eq!(*updates.lock(), vec![(2, 0), (4, 0), (6, 0)]);
}

#[tokio::test]
async fn incremental_run_soft_deletes_missing_products() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    harness
        .source
        .set_pages(pages(&[&["A", "B"], &["D", "E"], &["F"]]));
    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 5,
            removed: 1
        }
    );

    let products = harness.products().await;
    let completed_at = harness.storefront().await.last_backup_at;
    assert_eq!(products["C"].removed_at, completed_at);
    for id in ["A", "B", "D", "E", "F"] {
        assert!(products[id].removed_at.is_none(), "{} should be active", id);
    }
    assert_eq!(harness.storefront().await.product_count, 5);
}

#[tokio::test]
async fn back_to_back_incremental_runs_reconcile_every_time() {
    let harness = Harness::new(six_products());

    for round in 0..50 {
        harness.source.set_pages(pages(&[&["A", "B"], &["C", "D"], &["E", "F"]]));
        assert_eq!(
            harness.run().await,
            RunOutcome::Completed {
                products: 6,
                removed: 0
            },
            "full catalog, round {}",
            round
        );

        harness
            .source
            .set_pages(pages(&[&["A", "B"], &["D", "E"], &["F"]]));
        assert_eq!(
            harness.run().await,
            RunOutcome::Completed {
                products: 5,
                removed: 1
            },
            "C removed, round {}",
            round
        );
        assert!(harness.products().await["C"].removed_at.is_some());
    }
}

#[tokio::test]
async fn reconciliation_ignores_write_timestamps() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    // Copies stamped in the future, as after the wall clock stepped back
    let ahead: Vec<_> = harness
        .products()
        .await
        .into_values()
        .map(|mut p| {
            p.sniffer_updated_at = p.sniffer_updated_at + chrono::Duration::minutes(5);
            p
        })
        .collect();
    harness.store.upsert_products(&ahead).await.unwrap();

    harness.source.set_pages(pages(&[&["A", "B"]]));
    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 2,
            removed: 4
        }
    );
    let products = harness.products().await;
    for id in ["C", "D", "E", "F"] {
        assert!(products[id].removed_at.is_some(), "{} should be removed", id);
    }
}

#[tokio::test]
async fn removed_product_reappearing_is_restored() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    harness.source.set_pages(pages(&[&["A", "B"], &["D"]]));
    assert!(harness.run().await.is_completed());
    assert!(harness.products().await["C"].removed_at.is_some());

    harness.source.set_pages(pages(&[&["A", "B"], &["C", "D"]]));
    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 4,
            removed: 0
        }
    );
    assert!(harness.products().await["C"].removed_at.is_none());
}

#[tokio::test]
async fn rerun_over_unchanged_catalog_is_idempotent() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());
    let first = harness.products().await;

    assert!(harness.run().await.is_completed());
    let second = harness.products().await;

    assert_eq!(first.len(), second.len());
    for (id, product) in &first {
        let again = &second[id];
        assert_eq!(again.title, product.title);
        assert_eq!(again.variants, product.variants);
        assert!(again.removed_at.is_none());
    }
    assert_eq!(harness.storefront().await.product_count, 6);
}

#[tokio::test]
async fn records_without_id_are_skipped() {
    let mut catalog = pages(&[&["A"]]);
    catalog[0].push(json!({ "title": "No identifier" }));
    let harness = Harness::new(PagedSource::new(catalog));

    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 1,
            removed: 0
        }
    );
    assert_eq!(harness.products().await.len(), 1);
}

#[tokio::test]
async fn empty_catalog_completes_with_zero_products() {
    let harness = Harness::new(PagedSource::new(vec![vec![]]));

    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 0,
            removed: 0
        }
    );
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Complete);
}

// ============================================================================
// Pause and resume
// ============================================================================

#[tokio::test]
async fn pause_after_second_page_then_resume_at_third() {
    let harness = Harness::new(PagedSource::new(pages(&[
        &["A", "B"],
        &["C", "D"],
        &["E", "F"],
        &["G", "H"],
        &["I", "J"],
    ])));

    let control = RunControl::new(no_progress());
    let signal = control.signal().clone();
    control.replace_progress(Arc::new(move |fetched, _| {
        if fetched == 4 {
            signal.request_pause();
        }
    }));

    let outcome = harness.engine.run(STOREFRONT, &control).await;

    assert_eq!(outcome, RunOutcome::Paused { products_fetched: 4 });
    assert_eq!(harness.source.calls().len(), 2);
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Paused);

    let cursor = harness.cursor().await.expect("cursor kept while paused");
    assert_eq!(cursor.cursor, Some(token(2)));
    assert_eq!(cursor.products_fetched, 4);
    assert_eq!(cursor.total_products, Some(10));
    assert!(harness.notifier.sent().is_empty());

    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 10,
            removed: 0
        }
    );
    assert_eq!(harness.source.calls()[2], Some(token(2)));
    assert_eq!(harness.source.calls().len(), 5);
    assert!(harness
        .log_messages()
        .await
        .iter()
        .any(|m| m == "Resuming backup"));
}

#[tokio::test]
async fn pause_does_not_soft_delete() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    // C and D disappear upstream, but the run pauses before seeing the rest
    harness.source.set_pages(pages(&[&["A", "B"], &["E", "F"]]));
    let control = RunControl::new(no_progress());
    control.signal().request_pause();

    let outcome = harness.engine.run(STOREFRONT, &control).await;

    assert_eq!(outcome, RunOutcome::Paused { products_fetched: 0 });
    assert!(harness
        .products()
        .await
        .values()
        .all(|p| p.removed_at.is_none()));
}

#[tokio::test]
async fn traversal_spanning_a_resume_keeps_products_seen_before_pause() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    harness
        .source
        .set_pages(pages(&[&["A", "B"], &["D", "E"], &["F"]]));

    let control = RunControl::new(no_progress());
    let signal = control.signal().clone();
    control.replace_progress(Arc::new(move |fetched, _| {
        if fetched == 2 {
            signal.request_pause();
        }
    }));
    assert!(matches!(
        harness.engine.run(STOREFRONT, &control).await,
        RunOutcome::Paused { .. }
    ));

    let traversal_id = harness.cursor().await.expect("paused cursor").traversal_id;
    let products = harness.products().await;
    assert_eq!(products["A"].traversal_id.as_ref(), Some(&traversal_id));
    assert_ne!(products["C"].traversal_id.as_ref(), Some(&traversal_id));

    let outcome = harness.run().await;

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 5,
            removed: 1
        }
    );
    let products = harness.products().await;
    for id in ["A", "B", "D", "E", "F"] {
        assert_eq!(products[id].traversal_id.as_ref(), Some(&traversal_id));
    }
    assert!(products["A"].removed_at.is_none());
    assert!(products["B"].removed_at.is_none());
    assert!(products["C"].removed_at.is_some());
}

#[tokio::test]
async fn cancel_discards_cursor_and_keeps_products() {
    let harness = Harness::new(six_products());
    let control = RunControl::new(no_progress());
    let signal = control.signal().clone();
    control.replace_progress(Arc::new(move |fetched, _| {
        if fetched == 2 {
            signal.request_cancel();
        }
    }));

    let outcome = harness.engine.run(STOREFRONT, &control).await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::Cancelled));
    assert!(harness.cursor().await.is_none());
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);
    assert_eq!(harness.products().await.len(), 2);
    assert!(harness.notifier.sent().is_empty());
    assert!(harness
        .log_messages()
        .await
        .iter()
        .any(|m| m == "Backup cancelled by user"));

    // A later run starts over from the first page
    assert!(harness.run().await.is_completed());
    assert_eq!(harness.source.calls()[1], None);
}

// ============================================================================
// Rate limiting and API failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn throttled_once_then_succeeds() {
    let harness = Harness::new(six_products());
    harness.source.throttle_at(Some(&token(1)), 1);
    let started = tokio::time::Instant::now();

    let outcome = harness.run().await;

    assert!(outcome.is_completed());
    assert_eq!(
        harness.source.calls(),
        vec![None, Some(token(1)), Some(token(1)), Some(token(2))]
    );
    assert!(started.elapsed() >= std::time::Duration::from_millis(2000));
    assert_eq!(harness.products().await.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn throttled_twice_ends_partial_with_cursor_unchanged() {
    let harness = Harness::new(six_products());
    harness.source.throttle_at(Some(&token(1)), 2);

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::Throttled));
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);

    let cursor = harness.cursor().await.expect("cursor kept after throttling");
    assert_eq!(cursor.cursor, Some(token(1)));
    assert_eq!(cursor.products_fetched, 2);
    assert_eq!(harness.products().await.len(), 2);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].kind, NotificationKind::Failed { .. }));

    // The next run picks up where the throttled one stopped
    let outcome = harness.run().await;
    assert!(outcome.is_completed());
    assert_eq!(harness.source.calls()[3], Some(token(1)));
}

#[tokio::test]
async fn api_error_ends_partial_and_logs_body() {
    let harness = Harness::new(six_products());
    harness.source.respond_at(
        Some(&token(1)),
        RawResponse::new(500, json!({ "errors": [ { "message": "Internal error" } ] })),
    );

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::Api { status: 500 }));
    assert_eq!(harness.products().await.len(), 2);

    let logs = harness.logs().await;
    let failure = logs
        .iter()
        .find(|l| l.level == LogLevel::Error)
        .expect("error entry");
    assert!(failure.message.contains("500"));
    assert!(failure.detail.as_deref().unwrap_or("").contains("Internal error"));
}

#[tokio::test]
async fn error_payload_with_success_status_is_failure() {
    let harness = Harness::new(six_products());
    harness.source.respond_at(
        None,
        RawResponse::new(200, json!({ "errors": [ { "message": "Access denied" } ] })),
    );

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::Api { status: 200 }));
    assert!(harness.products().await.is_empty());
}

#[tokio::test]
async fn missing_product_data_ends_partial() {
    let harness = Harness::new(six_products());
    harness
        .source
        .respond_at(None, RawResponse::new(200, json!({ "data": { "shop": {} } })));

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::MissingData));
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[tokio::test]
async fn partial_run_does_not_soft_delete() {
    let harness = Harness::new(six_products());
    assert!(harness.run().await.is_completed());

    harness.source.set_pages(pages(&[&["A", "B"], &["E", "F"]]));
    harness
        .source
        .respond_at(Some(&token(1)), RawResponse::new(503, json!({})));

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::Api { status: 503 }));
    assert!(harness
        .products()
        .await
        .values()
        .all(|p| p.removed_at.is_none()));
    assert_eq!(harness.storefront().await.product_count, 6);
}

// ============================================================================
// Unexpected failures
// ============================================================================

#[tokio::test]
async fn quota_exceeded_keeps_saved_products() {
    let harness = Harness::with_store(six_products(), MemoryCatalogStore::with_product_capacity(3));

    let outcome = harness.run().await;

    assert_eq!(outcome, RunOutcome::Partial(PartialReason::QuotaExceeded));
    assert_eq!(harness.products().await.len(), 2);
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::QuotaExceeded);
    assert!(harness
        .logs()
        .await
        .iter()
        .any(|l| l.level == LogLevel::Error && l.message.contains("quota")));
}

#[tokio::test]
async fn transport_error_ends_partial_without_notification() {
    let harness = Harness::new(six_products());
    harness.source.disconnect_at(Some(&token(2)));

    let outcome = harness.run().await;

    assert!(matches!(
        outcome,
        RunOutcome::Partial(PartialReason::Unexpected(_))
    ));
    assert_eq!(harness.products().await.len(), 4);
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);
    assert!(harness.notifier.sent().is_empty());
    assert!(harness
        .log_messages()
        .await
        .iter()
        .any(|m| m.starts_with("Backup failed")));
}
