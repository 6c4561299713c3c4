//! Integration tests for the period guard

mod cli_replay;
mod import_scenarios;
mod persistence;
mod test_utils;
