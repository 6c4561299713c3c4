//! Last-import marker: which period/month the most recent successful import
//! ran against. Readers discard markers older than [`MARKER_TTL_MS`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::period::{Month, Period};
use crate::store::persistence::{
    load_best_effort, remove_best_effort, store_best_effort, SessionStorage, KEY_LAST_IMPORT,
};

pub const MARKER_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMarker {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub year: Period,
    pub month: Month,
}

impl ImportMarker {
    pub fn now(year: Period, month: Month) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            year,
            month,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) >= MARKER_TTL_MS
    }

    pub fn save(&self, storage: &dyn SessionStorage) -> bool {
        store_best_effort(storage, KEY_LAST_IMPORT, self)
    }

    /// Load the marker, removing it from storage when expired.
    pub fn load(storage: &dyn SessionStorage) -> Option<Self> {
        Self::load_at(storage, Utc::now().timestamp_millis())
    }

    pub fn load_at(storage: &dyn SessionStorage, now_ms: i64) -> Option<Self> {
        let marker: ImportMarker = load_best_effort(storage, KEY_LAST_IMPORT)?;
        if marker.is_expired(now_ms) {
            debug!(timestamp = marker.timestamp, "discarding expired import marker");
            remove_best_effort(storage, KEY_LAST_IMPORT);
            return None;
        }
        Some(marker)
    }

    /// Read-only variant of [`ImportMarker::load`]: an expired marker is
    /// reported as absent but left in storage.
    pub fn peek(storage: &dyn SessionStorage) -> Option<Self> {
        Self::peek_at(storage, Utc::now().timestamp_millis())
    }

    pub fn peek_at(storage: &dyn SessionStorage, now_ms: i64) -> Option<Self> {
        let marker: ImportMarker = load_best_effort(storage, KEY_LAST_IMPORT)?;
        (!marker.is_expired(now_ms)).then_some(marker)
    }
}
