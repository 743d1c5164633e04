//! End-to-end job admission and pipeline tests.

mod common;

use std::time::Duration;

use common::TestHarness;
use vacdesk_core::{EntryReason, JobRequest, QuotaMode, StatusEvent, UserId};
use vacdesk_engine::EngineError;

fn request() -> JobRequest {
    JobRequest::new("rust developer", "Moscow")
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn free_job_runs_and_produces_an_artifact() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let user = UserId::new(1);

    let report = harness.engine.run_job(user, request()).await.unwrap();

    assert_eq!(report.outcome.mode, QuotaMode::Free);
    assert_eq!(report.outcome.free_used, 1);
    assert!(report.artifact.report_path.exists());
    assert!(report.artifact.csv_path.as_ref().unwrap().exists());

    // Slot is free again.
    assert!(!harness.engine.is_busy(user));
}

#[tokio::test]
async fn paid_job_debits_exactly_one_credit() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let user = UserId::new(2);
    harness
        .store
        .grant_credits(user, 2, EntryReason::Purchase, None)
        .await
        .unwrap();

    let report = harness.engine.run_job(user, request()).await.unwrap();
    assert_eq!(report.outcome.mode, QuotaMode::Paid);
    assert_eq!(report.outcome.credits, 1);
    assert_eq!(harness.store.credits(user).await.unwrap(), 1);
}

#[tokio::test]
async fn status_events_are_surfaced_in_order() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let user = UserId::new(10);

    let mut seen = Vec::new();
    harness
        .engine
        .run_job_with_progress(user, request(), |event| {
            seen.push(match event {
                StatusEvent::Csv { .. } => "csv",
                StatusEvent::Report { .. } => "report",
                StatusEvent::Done { .. } => "done",
            });
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["csv", "report", "done"]);
}

#[tokio::test]
async fn unannounced_artifact_is_found_by_directory_scan() {
    let harness = TestHarness::new().await;
    harness.install_silent_pipeline();
    let user = UserId::new(3);

    let report = harness.engine.run_job(user, request()).await.unwrap();
    assert_eq!(
        report.artifact.report_path,
        harness.user_report_dir(3).join("quiet.xlsx")
    );
}

#[tokio::test]
async fn report_event_with_other_format_does_not_name_the_artifact() {
    let harness = TestHarness::new().await;
    harness.install_pipeline(
        r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
mkdir -p "$out"
printf 'pdf' > "$out/report.pdf"
printf 'report' > "$out/report.xlsx"
echo "{\"status\":\"report\",\"format\":\"pdf\",\"path\":\"$out/report.pdf\"}"
"#,
    );
    let user = UserId::new(11);

    let report = harness.engine.run_job(user, request()).await.unwrap();
    assert_eq!(
        report.artifact.report_path,
        harness.user_report_dir(11).join("report.xlsx")
    );
}

// ============================================================================
// Quota denial
// ============================================================================

#[tokio::test]
async fn exhausted_quota_denies_and_parks_the_request() {
    let harness = TestHarness::new().await;
    harness.install_succeeding_pipeline();
    let user = UserId::new(4);

    for _ in 0..3 {
        harness.engine.run_job(user, request()).await.unwrap();
    }

    let err = harness.engine.run_job(user, request()).await.unwrap_err();
    let EngineError::QuotaDenied(decision) = err else {
        panic!("expected quota denial");
    };
    assert!(!decision.allowed);
    assert!(decision.user_message.is_some());

    // The request was parked for resumption, and only once.
    let saved = harness.engine.take_saved_request(user).unwrap();
    assert_eq!(saved.query, "rust developer");
    assert!(harness.engine.take_saved_request(user).is_none());

    // Denial must not leak the admission slot.
    assert!(!harness.engine.is_busy(user));
}

// ============================================================================
// Admission control
// ============================================================================

#[tokio::test]
async fn second_job_for_the_same_user_is_rejected_while_running() {
    let harness = TestHarness::new().await;
    harness.install_pipeline("#!/bin/sh\nsleep 1\n");
    let user = UserId::new(5);

    let engine = harness.engine.clone();
    let first = tokio::spawn(async move { engine.run_job(user, request()).await });

    // Let the first job claim its slot.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.engine.is_busy(user));

    let err = harness.engine.run_job(user, request()).await.unwrap_err();
    assert!(matches!(err, EngineError::UserBusy));

    // First job fails on missing artifact but must still release.
    let _ = first.await.unwrap();
    assert!(!harness.engine.is_busy(user));
}

#[tokio::test]
async fn global_capacity_is_bounded() {
    let harness = TestHarness::with_config(|c| c.max_concurrent_jobs = 1).await;
    harness.install_pipeline("#!/bin/sh\nsleep 1\n");

    let engine = harness.engine.clone();
    let first = tokio::spawn(async move { engine.run_job(UserId::new(6), request()).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = harness
        .engine
        .run_job(UserId::new(7), request())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AtCapacity));
    // The rejected user must not be stuck busy.
    assert!(!harness.engine.is_busy(UserId::new(7)));

    let _ = first.await.unwrap();
}

// ============================================================================
// Failure modes
// ============================================================================

#[tokio::test]
async fn hung_pipeline_is_killed_and_the_slot_freed() {
    let harness = TestHarness::with_config(|c| {
        c.job_timeout = Duration::from_secs(1);
    })
    .await;
    harness.install_hanging_pipeline();
    let user = UserId::new(8);

    let err = harness.engine.run_job(user, request()).await.unwrap_err();
    let EngineError::JobTimeout { timeout_secs, .. } = err else {
        panic!("expected timeout");
    };
    assert_eq!(timeout_secs, 1);

    // Slot released, next job admits immediately.
    assert!(!harness.engine.is_busy(user));
    harness.install_succeeding_pipeline();
    harness.engine.run_job(user, request()).await.unwrap();
}

#[tokio::test]
async fn failing_pipeline_reports_exit_code_and_tail() {
    let harness = TestHarness::new().await;
    harness.install_failing_pipeline();
    let user = UserId::new(9);

    let err = harness.engine.run_job(user, request()).await.unwrap_err();
    let EngineError::JobFailed { detail, tail } = err else {
        panic!("expected failure");
    };
    assert!(detail.contains("code 3"), "detail: {detail}");
    assert!(tail.iter().any(|l| l.contains("connection refused")));
    assert!(tail.iter().any(|l| l.contains("retrying")));

    // A failed run still consumed the quota; the debit happened at
    // admission time.
    assert_eq!(harness.store.free_used_this_month(user).await.unwrap(), 1);
    assert!(!harness.engine.is_busy(user));
}
