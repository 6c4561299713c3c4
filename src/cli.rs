//! CLI domain: parse, route, output, and presentation only.
//! Route table dispatches to the guard runtime; no coordination logic lives here.

mod output;
mod parse;
mod presentation;
mod route;
mod simulate;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_config_toml, format_diagnostics_json, format_diagnostics_text, format_history_json,
    format_history_table, format_replay_summary, TerminalSink,
};
pub use route::{parse_script, ReplaySummary, RunContext, ScriptStep};
pub use simulate::SimulatedRefresh;
