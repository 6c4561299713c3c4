//! periodguard: keeps the active accounting period stable across data imports.
//!
//! A host announces imports through log lines or custom events. The
//! [`coordinator::ImportCoordinator`] records the period that was active when
//! the import began, restores it when the import completes, and holds a short
//! lock during which competing period changes are rejected and re-asserted.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod notify;
pub mod period;
pub mod reconcile;
pub mod refresh;
pub mod runtime;
pub mod signal;
pub mod store;
