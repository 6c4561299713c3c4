//! Host output adapter.
//!
//! The reporting page announces import progress only through its log output and
//! a handful of DOM custom events. This is the one place where that text is
//! matched; everything downstream consumes typed [`Signal`]s.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::coordinator::SessionId;
use crate::period::{ChangeSource, Period};
use crate::signal::events::Signal;

const IMPORT_FAILED_MARKERS: &[&str] = &[
    "インポートエラー",
    "インポートに失敗",
    "Import failed",
];

const IMPORT_COMPLETED_MARKERS: &[&str] = &[
    "インポート成功コールバックを実行",
    "月次データをインポートしました",
    "インポート完了",
    "Import completed",
];

const IMPORT_STARTED_MARKERS: &[&str] = &[
    "インポート処理開始",
    "CSVファイルから月次データをインポート",
    "CSVデータをインポート",
    "Import started",
];

const PERIOD_DETECTED_MARKERS: &[&str] = &[
    "CSV列名から年度を検出:",
    "CSVから年度を検出:",
    "Detected fiscal year:",
];

/// Batch summary logged after the import requests settle: `成功したレスポンス: 3/12`.
const RESPONSE_SUMMARY_MARKER: &str = "成功したレスポンス:";

pub const EVENT_FISCAL_YEAR_CHANGED: &str = "fiscalYearChanged";
pub const EVENT_PERIOD_DETECTED: &str = "periodDetected";
pub const EVENT_IMPORT_STARTED: &str = "importStarted";
pub const EVENT_IMPORT_COMPLETED: &str = "importCompleted";

/// A host custom event as it appears in a replay script.
#[derive(Debug, Deserialize)]
pub struct HostEvent {
    pub event: String,
    #[serde(default)]
    pub detail: Value,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogLineAdapter;

impl LogLineAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Translate one raw host line. JSON objects are treated as host custom
    /// events, anything else as a log line.
    pub fn translate_raw(&self, raw: &str) -> Option<Signal> {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            return match serde_json::from_str::<HostEvent>(trimmed) {
                Ok(event) => self.translate_host_event(&event.event, &event.detail),
                Err(err) => {
                    warn!(error = %err, "ignoring malformed host event");
                    None
                }
            };
        }
        self.translate_log_line(trimmed)
    }

    /// Match a log line against the known import phrases.
    ///
    /// Failure phrases win over completion phrases, which win over detection
    /// and start phrases.
    pub fn translate_log_line(&self, line: &str) -> Option<Signal> {
        if contains_any(line, IMPORT_FAILED_MARKERS) {
            debug!(line = %line, "import failure line");
            return Some(Signal::ImportCompleted {
                success: false,
                session: None,
            });
        }
        if let Some(rest) = after_marker(line, RESPONSE_SUMMARY_MARKER) {
            let success = successful_responses(rest) != Some(0);
            debug!(line = %line, success, "import response summary line");
            return Some(Signal::ImportCompleted {
                success,
                session: None,
            });
        }
        if contains_any(line, IMPORT_COMPLETED_MARKERS) {
            debug!(line = %line, "import completion line");
            return Some(Signal::ImportCompleted {
                success: true,
                session: None,
            });
        }
        if let Some(raw) = detected_year(line) {
            return match Period::new(raw) {
                Ok(period) => Some(Signal::PeriodDetected { period }),
                Err(err) => {
                    warn!(line = %line, error = %err, "detected period out of range");
                    None
                }
            };
        }
        if contains_any(line, IMPORT_STARTED_MARKERS) {
            debug!(line = %line, "import start line");
            return Some(Signal::ImportStarted);
        }
        None
    }

    /// Translate a host custom event name and its `detail` payload.
    pub fn translate_host_event(&self, name: &str, detail: &Value) -> Option<Signal> {
        match name {
            EVENT_FISCAL_YEAR_CHANGED => {
                let period = detail.get("year").and_then(Value::as_i64)?;
                Some(Signal::PeriodChangeRequest {
                    period,
                    source: ChangeSource::Event,
                })
            }
            EVENT_PERIOD_DETECTED => {
                let raw = detail.get("year").and_then(Value::as_i64)?;
                Period::new(raw)
                    .ok()
                    .map(|period| Signal::PeriodDetected { period })
            }
            EVENT_IMPORT_STARTED => Some(Signal::ImportStarted),
            EVENT_IMPORT_COMPLETED => {
                let success = detail
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let session = detail
                    .get("session")
                    .and_then(Value::as_u64)
                    .map(SessionId::from_raw);
                Some(Signal::ImportCompleted { success, session })
            }
            other => {
                debug!(event = %other, "unhandled host event");
                None
            }
        }
    }
}

fn contains_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| line.contains(marker))
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|idx| &line[idx + marker.len()..])
}

fn leading_digits(text: &str) -> String {
    text.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

/// Four ASCII digits following a detection marker.
fn detected_year(line: &str) -> Option<i64> {
    let rest = PERIOD_DETECTED_MARKERS
        .iter()
        .find_map(|marker| after_marker(line, marker))?;
    let digits = leading_digits(rest);
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

/// Successful count from `n/m`; `None` when the summary carries no count.
fn successful_responses(rest: &str) -> Option<u64> {
    let digits = leading_digits(rest);
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
