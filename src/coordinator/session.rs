//! Import session and coordinator state types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// Identifies one import session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    /// Import detected; completion not yet observed.
    ImportStarting,
    /// Lock held until its timeout elapses.
    ImportLocked,
    /// Restoration write in progress.
    Restoring,
}

impl CoordinatorState {
    pub fn as_str(self) -> &'static str {
        match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::ImportStarting => "import_starting",
            CoordinatorState::ImportLocked => "import_locked",
            CoordinatorState::Restoring => "restoring",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: SessionId,
    pub preceding_period: Period,
    /// What the import believes it is importing. Never written to the store.
    pub detected_period: Option<Period>,
    pub started_at: DateTime<Utc>,
}

impl ImportSession {
    pub fn new(id: SessionId, preceding_period: Period, detected_period: Option<Period>) -> Self {
        Self {
            id,
            preceding_period,
            detected_period,
            started_at: Utc::now(),
        }
    }
}
