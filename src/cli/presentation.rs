//! CLI presentation: text and json formatters, plus the terminal notification
//! sink.

use std::sync::atomic::{AtomicUsize, Ordering};

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use tracing::debug;

use crate::cli::route::ReplaySummary;
use crate::config::GuardConfig;
use crate::coordinator::{CoordinatorState, Diagnostics};
use crate::error::GuardError;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::period::{ChangeOutcome, PeriodChangeRecord};

/// Prints notifications to stdout as they are presented.
#[derive(Debug, Default)]
pub struct TerminalSink {
    presented: AtomicUsize,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }
}

impl NotificationSink for TerminalSink {
    fn present(&self, notification: &Notification) {
        self.presented.fetch_add(1, Ordering::SeqCst);
        match notification.kind {
            NotificationKind::Success => println!("{} {}", "✔".green(), notification.message),
            NotificationKind::Error => println!("{} {}", "✖".red(), notification.message.red()),
            NotificationKind::Info => println!("{} {}", "ℹ".blue(), notification.message),
        }
    }

    fn dismiss(&self, id: u64) {
        debug!(id, "notification dismissed");
    }
}

fn state_label(state: CoordinatorState) -> String {
    match state {
        CoordinatorState::Idle => state.as_str().green().to_string(),
        CoordinatorState::ImportStarting | CoordinatorState::Restoring => {
            state.as_str().yellow().to_string()
        }
        CoordinatorState::ImportLocked => state.as_str().red().to_string(),
    }
}

pub fn format_diagnostics_text(diagnostics: &Diagnostics) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Period".bold()));
    out.push_str(&format!(
        "  Current:      {} / month {}\n",
        diagnostics.current_period, diagnostics.month
    ));
    out.push_str(&format!("  State:        {}\n", state_label(diagnostics.state)));
    if let Some(session) = &diagnostics.session {
        out.push_str(&format!(
            "  Session:      {} (preceding {}, detected {})\n",
            session.id,
            session.preceding_period,
            session
                .detected_period
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    if diagnostics.lock_held {
        out.push_str(&format!(
            "  Lock:         held, {} ms remaining\n",
            diagnostics.lock_remaining_ms.unwrap_or(0)
        ));
    } else {
        out.push_str("  Lock:         free\n");
    }
    out.push_str(&format!("  History:      {} records\n", diagnostics.history_len));

    out.push_str(&format!("\n{}\n", "Refresh".bold()));
    out.push_str(&format!(
        "  Refreshing:   {} (attempt {})\n",
        diagnostics.refreshing,
        diagnostics.refresh_attempt + 1
    ));
    out.push_str(&format!("  Render key:   {}\n", diagnostics.render_key));

    out.push_str(&format!("\n{}\n", "Last import".bold()));
    match &diagnostics.last_import {
        Some(marker) => {
            let when = chrono::DateTime::from_timestamp_millis(marker.timestamp)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| marker.timestamp.to_string());
            out.push_str(&format!(
                "  {} (period {}, month {})\n",
                when, marker.year, marker.month
            ));
        }
        None => out.push_str(&format!("  {}\n", "none in the last 24 h".dimmed())),
    }
    out
}

pub fn format_diagnostics_json(diagnostics: &Diagnostics) -> Result<String, GuardError> {
    serde_json::to_string_pretty(diagnostics)
        .map_err(|e| GuardError::SerializationError(e.to_string()))
}

pub fn format_history_table(records: &[PeriodChangeRecord]) -> String {
    if records.is_empty() {
        return "No period changes recorded.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Time", "From", "To", "Source", "Outcome"]);
    for record in records {
        let outcome = match record.outcome {
            ChangeOutcome::Applied => record.outcome.as_str().green().to_string(),
            ChangeOutcome::NoOp => record.outcome.as_str().dimmed().to_string(),
            ChangeOutcome::Rejected => record.outcome.as_str().red().to_string(),
        };
        table.add_row(vec![
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.from_period.to_string(),
            record.to_period.to_string(),
            record.source.to_string(),
            outcome,
        ]);
    }
    table.to_string()
}

pub fn format_history_json(records: &[PeriodChangeRecord]) -> Result<String, GuardError> {
    serde_json::to_string_pretty(records).map_err(|e| GuardError::SerializationError(e.to_string()))
}

pub fn format_replay_summary(summary: &ReplaySummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Replay".bold()));
    out.push_str(&format!(
        "  Steps:        {} ({} signals, {} ignored)\n",
        summary.steps, summary.signals, summary.ignored
    ));
    let unchanged = summary.initial_period == summary.final_period;
    let period_line = format!("{} -> {}", summary.initial_period, summary.final_period);
    out.push_str(&format!(
        "  Period:       {}\n",
        if unchanged {
            period_line.green().to_string()
        } else {
            period_line.yellow().to_string()
        }
    ));
    out.push_str(&format!(
        "  Rendered:     {}\n",
        summary
            .rendered_period
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!("  State:        {}\n", state_label(summary.state)));
    out.push_str(&format!("  History:      {} records\n", summary.history_len));
    out.push_str(&format!("  Refreshes:    {}\n", summary.refresh_calls));
    out.push_str(&format!("  Notifications: {}\n", summary.notifications));
    out
}

pub fn format_config_toml(config: &GuardConfig) -> Result<String, GuardError> {
    toml::to_string_pretty(config).map_err(|e| GuardError::SerializationError(e.to_string()))
}
