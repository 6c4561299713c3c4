//! Signal schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::SessionId;
use crate::period::{ChangeSource, Period};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// The import announced which period it believes it is importing.
    PeriodDetected { period: Period },
    ImportStarted,
    ImportCompleted {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<SessionId>,
    },
    /// Raw value so that invalid requests can still be audited.
    PeriodChangeRequest { period: i64, source: ChangeSource },
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::PeriodDetected { .. } => "period_detected",
            Signal::ImportStarted => "import_started",
            Signal::ImportCompleted { .. } => "import_completed",
            Signal::PeriodChangeRequest { .. } => "period_change_request",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalEnvelope {
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub signal: Signal,
}

impl SignalEnvelope {
    pub fn with_now(seq: u64, signal: Signal) -> Self {
        Self {
            seq,
            received_at: Utc::now(),
            signal,
        }
    }
}
