//! Period Store
//!
//! Holds the single authoritative period value plus a bounded change history.
//! Every accepted change is persisted and published to subscribers
//! synchronously, in the order the changes were applied.

pub mod marker;
pub mod persistence;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::period::{ChangeOutcome, ChangeSource, Month, Period, PeriodChangeRecord};
use persistence::{
    load_best_effort, store_best_effort, SessionStorage, KEY_FISCAL_YEAR, KEY_HISTORY, KEY_MONTH,
};

pub use marker::ImportMarker;
pub use persistence::{MemoryStorage, SledStorage};

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Published after every accepted change and every re-assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodChanged {
    pub previous: Period,
    pub current: Period,
    pub source: ChangeSource,
    /// True when the value did not change but views must re-render it.
    pub reasserted: bool,
}

pub type PeriodListener = Arc<dyn Fn(&PeriodChanged) + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct FiscalYearRecord {
    #[serde(rename = "fiscalYear")]
    fiscal_year: Period,
}

#[derive(Debug, Serialize, Deserialize)]
struct MonthRecord {
    month: Month,
}

struct StoreState {
    current: Period,
    month: Month,
    history: VecDeque<PeriodChangeRecord>,
}

pub struct PeriodStore {
    state: Mutex<StoreState>,
    listeners: RwLock<Vec<PeriodListener>>,
    storage: Arc<dyn SessionStorage>,
    capacity: usize,
}

impl PeriodStore {
    /// Seed from storage, falling back to the current calendar period/month.
    pub fn open(storage: Arc<dyn SessionStorage>, capacity: usize) -> Self {
        let current = load_best_effort::<FiscalYearRecord>(storage.as_ref(), KEY_FISCAL_YEAR)
            .map(|r| r.fiscal_year)
            .unwrap_or_else(Period::current);
        let month = load_best_effort::<MonthRecord>(storage.as_ref(), KEY_MONTH)
            .map(|r| r.month)
            .unwrap_or_else(Month::current);
        let mut history: VecDeque<PeriodChangeRecord> =
            load_best_effort::<Vec<PeriodChangeRecord>>(storage.as_ref(), KEY_HISTORY)
                .unwrap_or_default()
                .into();
        while history.len() > capacity {
            history.pop_front();
        }
        debug!(period = %current, month = %month, history = history.len(), "period store opened");
        Self::from_parts(storage, current, month, history, capacity)
    }

    /// Start from an explicit period, ignoring anything persisted.
    pub fn with_initial(
        storage: Arc<dyn SessionStorage>,
        initial: Period,
        capacity: usize,
    ) -> Self {
        Self::from_parts(storage, initial, Month::current(), VecDeque::new(), capacity)
    }

    fn from_parts(
        storage: Arc<dyn SessionStorage>,
        current: Period,
        month: Month,
        history: VecDeque<PeriodChangeRecord>,
        capacity: usize,
    ) -> Self {
        Self {
            state: Mutex::new(StoreState {
                current,
                month,
                history,
            }),
            listeners: RwLock::new(Vec::new()),
            storage,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self) -> Period {
        self.state.lock().current
    }

    pub fn month(&self) -> Month {
        self.state.lock().month
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Apply a change request. Returns whether the value changed.
    ///
    /// No-op requests are not recorded; out-of-range requests are recorded as
    /// rejected.
    pub fn set(&self, raw: i64, source: ChangeSource) -> bool {
        self.apply(raw, source, false) == ChangeOutcome::Applied
    }

    /// Write `period` and record the outcome even when it is a no-op.
    pub fn restore(&self, period: Period, source: ChangeSource) -> ChangeOutcome {
        self.apply(period.value() as i64, source, true)
    }

    fn apply(&self, raw: i64, source: ChangeSource, record_noop: bool) -> ChangeOutcome {
        let (outcome, change) = {
            let mut state = self.state.lock();
            let previous = state.current;
            match Period::new(raw) {
                Err(err) => {
                    warn!(
                        from = %previous,
                        requested = raw,
                        source = %source,
                        error = %err,
                        "rejected invalid period"
                    );
                    self.push_record(
                        &mut state,
                        PeriodChangeRecord::new(previous, raw, source, ChangeOutcome::Rejected),
                    );
                    (ChangeOutcome::Rejected, None)
                }
                Ok(next) if next == previous => {
                    if record_noop {
                        self.push_record(
                            &mut state,
                            PeriodChangeRecord::new(previous, raw, source, ChangeOutcome::NoOp),
                        );
                    }
                    debug!(period = %previous, source = %source, "period unchanged");
                    (ChangeOutcome::NoOp, None)
                }
                Ok(next) => {
                    state.current = next;
                    self.push_record(
                        &mut state,
                        PeriodChangeRecord::new(previous, raw, source, ChangeOutcome::Applied),
                    );
                    store_best_effort(
                        self.storage.as_ref(),
                        KEY_FISCAL_YEAR,
                        &FiscalYearRecord { fiscal_year: next },
                    );
                    info!(from = %previous, to = %next, source = %source, "period changed");
                    (
                        ChangeOutcome::Applied,
                        Some(PeriodChanged {
                            previous,
                            current: next,
                            source,
                            reasserted: false,
                        }),
                    )
                }
            }
        };
        if let Some(change) = change {
            self.publish(&change);
        }
        outcome
    }

    /// Record a request that was refused while an import held the lock.
    pub fn record_blocked(&self, raw: i64) {
        let mut state = self.state.lock();
        let current = state.current;
        self.push_record(
            &mut state,
            PeriodChangeRecord::new(
                current,
                raw,
                ChangeSource::BlockedDuringImport,
                ChangeOutcome::Rejected,
            ),
        );
    }

    /// Re-publish the current value so views drop any value they rendered early.
    pub fn reassert(&self) {
        let current = self.get();
        debug!(period = %current, "re-asserting period");
        self.publish(&PeriodChanged {
            previous: current,
            current,
            source: ChangeSource::BlockedDuringImport,
            reasserted: true,
        });
    }

    pub fn set_month(&self, raw: i64) -> bool {
        let month = match Month::new(raw) {
            Ok(month) => month,
            Err(err) => {
                warn!(requested = raw, error = %err, "rejected invalid month");
                return false;
            }
        };
        let mut state = self.state.lock();
        if state.month == month {
            return false;
        }
        state.month = month;
        store_best_effort(self.storage.as_ref(), KEY_MONTH, &MonthRecord { month });
        true
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<PeriodChangeRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn subscribe(&self, listener: PeriodListener) {
        self.listeners.write().push(listener);
    }

    fn push_record(&self, state: &mut StoreState, record: PeriodChangeRecord) {
        state.history.push_back(record);
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }
        let snapshot: Vec<&PeriodChangeRecord> = state.history.iter().collect();
        store_best_effort(self.storage.as_ref(), KEY_HISTORY, &snapshot);
    }

    fn publish(&self, change: &PeriodChanged) {
        let listeners: Vec<PeriodListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(change);
        }
    }
}
