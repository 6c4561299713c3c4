//! End-to-end import scenarios driven through host log lines and events.

use super::test_utils::harness;
use periodguard::coordinator::CoordinatorState;
use periodguard::notify::NotificationKind;
use periodguard::period::{ChangeOutcome, ChangeSource, Period};
use periodguard::reconcile::{MemoryView, PeriodView};
use periodguard::store::ImportMarker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn japanese_import_log_keeps_selected_period() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();

    for line in [
        "[CSVImport] インポート処理開始",
        "CSV列名から年度を検出: 2025",
        "インポート結果: [object Object]",
        "成功したレスポンス: 12/12",
    ] {
        handle.emit_raw(line).unwrap();
    }
    handle.wait_idle().await;
    sleep(Duration::from_millis(10)).await;

    let diagnostics = handle.diagnostics();
    assert_eq!(diagnostics.current_period.value(), 2024);
    assert_eq!(diagnostics.state, CoordinatorState::ImportLocked);
    assert_eq!(diagnostics.render_key, 1);
    assert_eq!(h.refresh.calls(), 1);

    let marker = diagnostics.last_import.expect("marker written on success");
    assert_eq!(marker.year.value(), 2024);

    let presented = h.sink.presented();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].kind, NotificationKind::Success);

    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, ChangeSource::ImportComplete);
    assert_eq!(history[0].outcome, ChangeOutcome::NoOp);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn early_host_event_is_blocked_and_view_reconciled() {
    let h = harness(2024, 0);
    let view = Arc::new(MemoryView::new());
    h.runtime.attach_view(view.clone());
    let handle = h.runtime.handle();
    assert_eq!(view.rendered_period().map(Period::value), Some(2024));

    handle.emit_raw("Detected fiscal year: 2025").unwrap();
    handle.emit_raw("Import completed").unwrap();
    handle.wait_idle().await;

    // The host re-renders with the imported year and announces it.
    view.force(Period::new(2025).unwrap());
    handle
        .emit_raw(r#"{"event":"fiscalYearChanged","detail":{"year":2025}}"#)
        .unwrap();
    handle.wait_idle().await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(handle.current_period().value(), 2024);
    assert_eq!(view.rendered_period().map(Period::value), Some(2024));
    let last = handle.history().pop().unwrap();
    assert_eq!(last.source, ChangeSource::BlockedDuringImport);
    assert_eq!(last.to_period, 2025);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn changes_are_admitted_again_after_lock_timeout() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();
    handle.emit_raw("CSV列名から年度を検出: 2025").unwrap();
    handle.emit_raw("成功したレスポンス: 12/12").unwrap();
    handle.wait_idle().await;

    sleep(Duration::from_millis(3050)).await;
    assert_eq!(handle.diagnostics().state, CoordinatorState::Idle);
    assert!(!handle.diagnostics().lock_held);

    handle
        .emit_raw(r#"{"event":"fiscalYearChanged","detail":{"year":2025}}"#)
        .unwrap();
    handle.wait_idle().await;
    assert_eq!(handle.current_period().value(), 2025);
    let last = handle.history().pop().unwrap();
    assert_eq!(last.source, ChangeSource::Event);
    assert!(last.accepted);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_import_reports_error_and_skips_refresh() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();
    handle.emit_raw("CSV列名から年度を検出: 2025").unwrap();
    handle.emit_raw("インポートエラー: 列数が一致しません").unwrap();
    handle.wait_idle().await;
    sleep(Duration::from_millis(10)).await;

    let diagnostics = handle.diagnostics();
    assert_eq!(diagnostics.state, CoordinatorState::Idle);
    assert_eq!(diagnostics.current_period.value(), 2024);
    assert!(diagnostics.last_import.is_none());
    assert_eq!(h.refresh.calls(), 0);
    let presented = h.sink.presented();
    assert_eq!(presented.len(), 1);
    assert_eq!(presented[0].kind, NotificationKind::Error);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn batch_with_no_successful_responses_is_a_failed_import() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();
    handle.emit_raw("CSV列名から年度を検出: 2025").unwrap();
    handle.emit_raw("成功したレスポンス: 0/12").unwrap();
    handle.wait_idle().await;
    sleep(Duration::from_millis(10)).await;

    let diagnostics = handle.diagnostics();
    assert_eq!(diagnostics.state, CoordinatorState::Idle);
    assert_eq!(diagnostics.current_period.value(), 2024);
    assert_eq!(h.refresh.calls(), 0);
    assert_eq!(h.sink.presented()[0].kind, NotificationKind::Error);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_refresh_leaves_period_and_reports_error() {
    let h = harness(2024, u32::MAX);
    let handle = h.runtime.handle();
    handle.emit_raw("Detected fiscal year: 2025").unwrap();
    handle.emit_raw("Import completed").unwrap();
    handle.wait_idle().await;

    // Attempts at 0 ms, 1000 ms and 3000 ms.
    sleep(Duration::from_millis(999)).await;
    assert_eq!(h.refresh.calls(), 1);
    sleep(Duration::from_millis(2)).await;
    assert_eq!(h.refresh.calls(), 2);
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.refresh.calls(), 3);

    sleep(Duration::from_millis(5000)).await;
    assert_eq!(h.refresh.calls(), 3);
    assert_eq!(handle.current_period().value(), 2024);
    assert_eq!(handle.diagnostics().render_key, 0);
    let kinds: Vec<NotificationKind> = h.sink.presented().iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::Success, NotificationKind::Error]);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_import_after_release_uses_new_preceding_period() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();

    handle.emit_raw("Detected fiscal year: 2025").unwrap();
    handle.emit_raw("Import completed").unwrap();
    handle.wait_idle().await;
    sleep(Duration::from_millis(3100)).await;

    handle.request_period_change(2022, ChangeSource::Manual);
    handle.emit_raw("Detected fiscal year: 2030").unwrap();
    handle.emit_raw("Import completed").unwrap();
    handle.wait_idle().await;

    assert_eq!(handle.current_period().value(), 2022);
    let session = handle.diagnostics().session.unwrap();
    assert_eq!(session.preceding_period.value(), 2022);
    assert_eq!(session.detected_period.map(Period::value), Some(2030));
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn history_keeps_newest_twenty_records() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();
    for i in 0..25 {
        handle.request_period_change(2030 + i, ChangeSource::Manual);
    }
    let history = handle.history();
    assert_eq!(history.len(), 20);
    assert_eq!(history[0].to_period, 2035);
    assert_eq!(history[19].to_period, 2054);
    h.runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn out_of_range_request_is_recorded_and_ignored() {
    let h = harness(2024, 0);
    let handle = h.runtime.handle();
    assert!(!handle.request_period_change(1999, ChangeSource::Manual));
    assert_eq!(handle.current_period().value(), 2024);
    let history = handle.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, ChangeOutcome::Rejected);
    assert!(!history[0].accepted);
    assert!(ImportMarker::load(h.storage.as_ref()).is_none());
    h.runtime.shutdown().await;
}
