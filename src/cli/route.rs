//! CLI route: single route table and run context. Dispatches to the guard
//! runtime and presentation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_config_toml, format_diagnostics_json, format_diagnostics_text, format_history_json,
    format_history_table, format_replay_summary, TerminalSink,
};
use crate::cli::simulate::SimulatedRefresh;
use crate::config::{ConfigLoader, GuardConfig, StorageBackend};
use crate::coordinator::CoordinatorState;
use crate::error::GuardError;
use crate::period::{ChangeSource, Month, Period};
use crate::reconcile::{MemoryView, PeriodView};
use crate::runtime::GuardRuntime;
use crate::store::persistence::SessionStorage;
use crate::store::{MemoryStorage, PeriodStore, SledStorage};

const SIMULATED_REFRESH_LATENCY: Duration = Duration::from_millis(50);
const SETTLE_POLL: Duration = Duration::from_millis(50);

/// One parsed replay script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Host log line or JSON host event.
    Input { line: usize, text: String },
    /// `@wait <ms>`
    Wait { line: usize, ms: u64 },
    /// `@set <period>`: manual selection by the user.
    Set { line: usize, period: i64 },
}

/// Parse a replay script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, GuardError> {
    let mut steps = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(directive) = trimmed.strip_prefix('@') else {
            steps.push(ScriptStep::Input {
                line,
                text: trimmed.to_string(),
            });
            continue;
        };
        let mut parts = directive.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().ok_or_else(|| GuardError::ReplayError {
            line,
            message: format!("@{} needs an argument", name),
        })?;
        let number = |what: &str| {
            arg.parse::<i64>().map_err(|_| GuardError::ReplayError {
                line,
                message: format!("@{} expects {}, got '{}'", name, what, arg),
            })
        };
        match name {
            "wait" => {
                let ms = u64::try_from(number("milliseconds")?).map_err(|_| {
                    GuardError::ReplayError {
                        line,
                        message: "@wait cannot be negative".to_string(),
                    }
                })?;
                steps.push(ScriptStep::Wait { line, ms });
            }
            "set" => steps.push(ScriptStep::Set {
                line,
                period: number("a period")?,
            }),
            other => {
                return Err(GuardError::ReplayError {
                    line,
                    message: format!("unknown directive @{}", other),
                })
            }
        }
    }
    Ok(steps)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub signals: usize,
    pub ignored: usize,
    pub initial_period: Period,
    pub final_period: Period,
    pub rendered_period: Option<Period>,
    pub state: CoordinatorState,
    pub history_len: usize,
    pub refresh_calls: u32,
    pub notifications: usize,
}

/// Runtime context for CLI execution: workspace and resolved configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: GuardConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, GuardError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config: config.validated()?,
        })
    }

    pub fn with_config(workspace_root: PathBuf, config: GuardConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Open the configured session storage. Relative sled paths resolve
    /// against the workspace root.
    pub fn open_storage(&self) -> Result<Arc<dyn SessionStorage>, GuardError> {
        match self.config.storage.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
            StorageBackend::Sled => {
                let path = if self.config.storage.path.is_absolute() {
                    self.config.storage.path.clone()
                } else {
                    self.workspace_root.join(&self.config.storage.path)
                };
                std::fs::create_dir_all(&path)
                    .map_err(|e| GuardError::StorageError(e.into()))?;
                debug!(path = %path.display(), "opening sled session storage");
                Ok(Arc::new(SledStorage::open(&path)?))
            }
        }
    }

    pub fn execute(&self, command: &Commands) -> Result<String, GuardError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GuardError::RuntimeError(e.to_string()))?;
        rt.block_on(self.dispatch(command))
    }

    async fn dispatch(&self, command: &Commands) -> Result<String, GuardError> {
        match command {
            Commands::Replay {
                script,
                fail_refreshes,
                initial_period,
                format,
            } => {
                let text = std::fs::read_to_string(script).map_err(|e| GuardError::ReplayError {
                    line: 0,
                    message: format!("cannot read {}: {}", script.display(), e),
                })?;
                let steps = parse_script(&text)?;
                let summary = self.replay(&steps, *fail_refreshes, *initial_period).await?;
                match format.as_str() {
                    "json" => serde_json::to_string_pretty(&summary)
                        .map_err(|e| GuardError::SerializationError(e.to_string())),
                    _ => Ok(format_replay_summary(&summary)),
                }
            }
            Commands::Status { format } => {
                let runtime = self.start_runtime(None)?;
                let diagnostics = runtime.handle().diagnostics();
                runtime.shutdown().await;
                match format.as_str() {
                    "json" => format_diagnostics_json(&diagnostics),
                    _ => Ok(format_diagnostics_text(&diagnostics)),
                }
            }
            Commands::History { format, limit } => {
                let store = PeriodStore::open(self.open_storage()?, self.config.history.capacity);
                let mut records = store.history();
                if let Some(limit) = limit {
                    let skip = records.len().saturating_sub(*limit);
                    records = records.split_off(skip);
                }
                match format.as_str() {
                    "json" => format_history_json(&records),
                    _ => Ok(format_history_table(&records)),
                }
            }
            Commands::Set { period, month } => {
                let requested = Period::new(*period)?;
                let month = month.map(Month::new).transpose()?;
                let runtime = self.start_runtime(None)?;
                let handle = runtime.handle();
                let changed = handle.request_period_change(*period, ChangeSource::Manual);
                let mut message = if changed {
                    format!("Period set to {}", requested)
                } else {
                    format!("Period unchanged ({})", handle.current_period())
                };
                if let Some(month) = month {
                    handle.coordinator().store().set_month(month.value() as i64);
                    message.push_str(&format!(", month {}", month));
                }
                runtime.shutdown().await;
                Ok(message)
            }
            Commands::Config => format_config_toml(&self.config),
        }
    }

    fn open_store(&self, initial_period: Option<i64>) -> Result<Arc<PeriodStore>, GuardError> {
        let storage = self.open_storage()?;
        let capacity = self.config.history.capacity;
        let store = match initial_period {
            Some(raw) => PeriodStore::with_initial(storage, Period::new(raw)?, capacity),
            None => PeriodStore::open(storage, capacity),
        };
        Ok(Arc::new(store))
    }

    fn start_runtime(&self, initial_period: Option<i64>) -> Result<GuardRuntime, GuardError> {
        Ok(GuardRuntime::start_with_store(
            self.config.clone(),
            self.open_store(initial_period)?,
            Arc::new(SimulatedRefresh::new(0, SIMULATED_REFRESH_LATENCY)),
            Arc::new(TerminalSink::new()),
        ))
    }

    async fn replay(
        &self,
        steps: &[ScriptStep],
        fail_refreshes: u32,
        initial_period: Option<i64>,
    ) -> Result<ReplaySummary, GuardError> {
        let store = self.open_store(initial_period)?;
        let refresh = Arc::new(SimulatedRefresh::new(fail_refreshes, SIMULATED_REFRESH_LATENCY));
        let sink = Arc::new(TerminalSink::new());
        let runtime = GuardRuntime::start_with_store(
            self.config.clone(),
            store,
            refresh.clone(),
            sink.clone(),
        );
        let view = Arc::new(MemoryView::new());
        runtime.attach_view(view.clone());
        let handle = runtime.handle();
        let initial = handle.current_period();
        info!(steps = steps.len(), initial = %initial, "replaying script");

        let mut signals = 0;
        let mut ignored = 0;
        for step in steps {
            match step {
                ScriptStep::Input { line, text } => match handle.emit_raw(text)? {
                    Some(seq) => {
                        debug!(line, seq, "line produced a signal");
                        signals += 1;
                    }
                    None => ignored += 1,
                },
                ScriptStep::Wait { ms, .. } => {
                    handle.wait_idle().await;
                    sleep(Duration::from_millis(*ms)).await;
                }
                ScriptStep::Set { period, .. } => {
                    handle.wait_idle().await;
                    handle.request_period_change(*period, ChangeSource::Manual);
                }
            }
        }

        handle.wait_idle().await;
        // A refresh spawned by the last completion may not have started yet.
        loop {
            sleep(SETTLE_POLL).await;
            if !handle.diagnostics().refreshing {
                break;
            }
        }
        let diagnostics = handle.diagnostics();
        runtime.shutdown().await;

        Ok(ReplaySummary {
            steps: steps.len(),
            signals,
            ignored,
            initial_period: initial,
            final_period: diagnostics.current_period,
            rendered_period: view.rendered_period(),
            state: diagnostics.state,
            history_len: diagnostics.history_len,
            refresh_calls: refresh.calls(),
            notifications: sink.presented(),
        })
    }
}
