//! Run manager unit tests.
//!
//! Single-run-per-storefront guarantee and the pause/resume/cancel control
//! surface, using a gated source to hold runs inside a fetch.

use catalog_backup_core::backup::{no_progress, PartialReason, RunOutcome};
use catalog_backup_core::model::{BackupStatus, LogLevel};

use super::helpers::{pages, recording_progress, token, Harness, PagedSource, STOREFRONT};

fn gated_six() -> PagedSource {
    PagedSource::gated(pages(&[&["A", "B"], &["C", "D"], &["E", "F"]]))
}

// ============================================================================
// Single run per storefront
// ============================================================================

#[tokio::test]
async fn second_start_attaches_to_running_backup() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let first = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;

    let (progress, updates) = recording_progress();
    let second = manager.start(STOREFRONT, progress).await;

    assert!(manager.is_active(STOREFRONT));
    assert_eq!(manager.active_storefronts(), vec![STOREFRONT.to_string()]);
    assert_eq!(second.storefront_id(), STOREFRONT);

    harness.source.release(10);
    let a = first.wait().await;
    let b = second.wait().await;

    assert_eq!(a, b);
    assert!(a.is_completed());
    // One loop only: each page fetched exactly once
    assert_eq!(
        harness.source.calls(),
        vec![None, Some(token(1)), Some(token(2))]
    );
    // Progress went to the most recent callback
    assert_eq!(updates.lock().last(), Some(&(6, 6)));
    assert!(!manager.is_active(STOREFRONT));
}

#[tokio::test]
async fn different_storefronts_run_independently() {
    let harness = Harness::new(PagedSource::new(pages(&[&["A"]])));
    let manager = harness.manager();

    let one = manager.start("one.example.com", no_progress()).await;
    let two = manager.start("two.example.com", no_progress()).await;

    assert!(one.wait().await.is_completed());
    assert!(two.wait().await.is_completed());
    assert_eq!(harness.source.calls().len(), 2);
}

// ============================================================================
// Control surface
// ============================================================================

#[tokio::test]
async fn pause_is_honored_at_next_boundary() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let handle = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;

    assert!(manager.pause(STOREFRONT));
    assert!(manager.pause(STOREFRONT));
    harness.source.release(1);

    assert_eq!(handle.wait().await, RunOutcome::Paused { products_fetched: 2 });
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Paused);
    assert_eq!(harness.cursor().await.unwrap().cursor, Some(token(1)));
    assert!(!manager.is_active(STOREFRONT));

    harness.source.release(10);
    let resumed = manager.resume(STOREFRONT, no_progress()).await;
    assert!(resumed.wait().await.is_completed());
    assert_eq!(harness.source.calls()[1], Some(token(1)));
}

#[tokio::test]
async fn resume_before_boundary_withdraws_pause() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let handle = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;

    manager.pause(STOREFRONT);
    let resumed = manager.resume(STOREFRONT, no_progress()).await;
    harness.source.release(10);

    assert!(handle.wait().await.is_completed());
    assert!(resumed.wait().await.is_completed());
    assert_eq!(harness.source.calls().len(), 3);
}

#[tokio::test]
async fn resume_after_run_began_stopping_starts_new_run() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    // Pause is requested before the first boundary, so the run stops
    // without fetching
    let first = manager.start(STOREFRONT, no_progress()).await;
    manager.pause(STOREFRONT);
    harness.wait_for_status(BackupStatus::Paused).await;
    harness.source.release(10);

    let handle = manager.resume(STOREFRONT, no_progress()).await;
    assert_eq!(first.wait().await, RunOutcome::Paused { products_fetched: 0 });
    assert!(handle.wait().await.is_completed());
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Complete);
}

#[tokio::test]
async fn control_calls_without_active_run() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    assert!(!manager.pause(STOREFRONT));
    assert!(!manager.cancel(STOREFRONT).await);
    assert!(!manager.pause_for_offline(STOREFRONT).await);
    assert!(manager.active_storefronts().is_empty());
}

#[tokio::test]
async fn cancel_active_run() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let handle = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;

    assert!(manager.cancel(STOREFRONT).await);
    // Pause after cancel does not downgrade the request
    manager.pause(STOREFRONT);
    harness.source.release(1);

    assert_eq!(
        handle.wait().await,
        RunOutcome::Partial(PartialReason::Cancelled)
    );
    assert!(harness.cursor().await.is_none());
    assert_eq!(harness.products().await.len(), 2);
}

#[tokio::test]
async fn cancel_paused_backup_discards_cursor() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let handle = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;
    manager.pause(STOREFRONT);
    harness.source.release(1);
    assert!(matches!(handle.wait().await, RunOutcome::Paused { .. }));

    assert!(manager.cancel(STOREFRONT).await);

    assert!(harness.cursor().await.is_none());
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);
    assert!(!manager.cancel(STOREFRONT).await);
}

#[tokio::test]
async fn pause_for_offline_logs_warning() {
    let harness = Harness::new(gated_six());
    let manager = harness.manager();

    let handle = manager.start(STOREFRONT, no_progress()).await;
    harness.source.wait_for_calls(1).await;

    assert!(manager.pause_for_offline(STOREFRONT).await);
    harness.source.release(1);

    assert!(matches!(handle.wait().await, RunOutcome::Paused { .. }));
    assert!(harness
        .logs()
        .await
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.message.starts_with("Connection lost")));
}

#[tokio::test]
async fn panicking_run_is_recorded_as_partial() {
    let harness = Harness::new(PagedSource::new(pages(&[&["A", "B"], &["C", "D"]])));
    harness.source.crash_at(Some(&token(1)));
    let manager = harness.manager();

    let outcome = manager.start(STOREFRONT, no_progress()).await.wait().await;

    assert!(matches!(
        outcome,
        RunOutcome::Partial(PartialReason::Unexpected(_))
    ));
    assert!(!manager.is_active(STOREFRONT));
    assert_eq!(harness.storefront().await.backup_status, BackupStatus::Partial);
    assert_eq!(harness.cursor().await.unwrap().cursor, Some(token(1)));
    assert!(harness
        .logs()
        .await
        .iter()
        .any(|l| l.level == LogLevel::Error && l.message == "Backup aborted unexpectedly"));

    // The next start continues from the last committed page
    let outcome = manager.start(STOREFRONT, no_progress()).await.wait().await;
    assert_eq!(
        outcome,
        RunOutcome::Completed {
            products: 4,
            removed: 0
        }
    );
}
