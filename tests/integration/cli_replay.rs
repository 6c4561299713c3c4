//! CLI route tests over a sled-backed workspace.

use periodguard::cli::{Commands, RunContext};
use periodguard::config::{GuardConfig, StorageBackend};
use periodguard::error::GuardError;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

fn sled_context(workspace: &TempDir) -> RunContext {
    let mut config = GuardConfig::default();
    config.storage.backend = StorageBackend::Sled;
    config.storage.path = PathBuf::from("state");
    RunContext::with_config(workspace.path().to_path_buf(), config)
}

fn write_script(workspace: &TempDir, body: &str) -> PathBuf {
    let path = workspace.path().join("import.log");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn replay_keeps_period_and_persists_history() {
    let workspace = TempDir::new().unwrap();
    let context = sled_context(&workspace);
    let script = write_script(
        &workspace,
        "# monthly import\n\
         [CSVImport] インポート処理開始\n\
         CSV列名から年度を検出: 2025\n\
         table rendered\n\
         成功したレスポンス: 12/12\n\
         {\"event\":\"fiscalYearChanged\",\"detail\":{\"year\":2025}}\n",
    );

    let output = context
        .execute(&Commands::Replay {
            script,
            fail_refreshes: 1,
            initial_period: Some(2024),
            format: "json".to_string(),
        })
        .unwrap();
    let summary: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(summary["initial_period"], 2024);
    assert_eq!(summary["final_period"], 2024);
    assert_eq!(summary["rendered_period"], 2024);
    assert_eq!(summary["signals"], 4);
    assert_eq!(summary["ignored"], 1);
    assert_eq!(summary["refresh_calls"], 2);

    let history = context
        .execute(&Commands::History {
            format: "json".to_string(),
            limit: None,
        })
        .unwrap();
    let records: Value = serde_json::from_str(&history).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["source"], "import_complete");
    assert_eq!(records[1]["source"], "blocked_during_import");
    assert_eq!(records[1]["toPeriod"], 2025);
}

#[test]
fn set_then_status_reports_new_period() {
    let workspace = TempDir::new().unwrap();
    let context = sled_context(&workspace);

    let message = context
        .execute(&Commands::Set {
            period: 2031,
            month: Some(4),
        })
        .unwrap();
    assert!(message.contains("2031"));

    let status = context
        .execute(&Commands::Status {
            format: "json".to_string(),
        })
        .unwrap();
    let status: Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["current_period"], 2031);
    assert_eq!(status["month"], 4);
    assert_eq!(status["state"], "idle");
    assert_eq!(status["lock_held"], false);
}

#[test]
fn set_rejects_out_of_range_period() {
    let workspace = TempDir::new().unwrap();
    let context = sled_context(&workspace);
    let err = context
        .execute(&Commands::Set {
            period: 2150,
            month: None,
        })
        .unwrap_err();
    assert!(matches!(err, GuardError::PeriodError(_)));
}

#[test]
fn replay_reports_script_errors_with_line_numbers() {
    let workspace = TempDir::new().unwrap();
    let context = sled_context(&workspace);
    let script = write_script(&workspace, "Import started\n@pause 10\n");
    let err = context
        .execute(&Commands::Replay {
            script,
            fail_refreshes: 0,
            initial_period: None,
            format: "text".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, GuardError::ReplayError { line: 2, .. }));
}
