//! Import Coordinator
//!
//! State machine that keeps an import from changing the visibly active period.
//!
//! ```text
//! Idle --PeriodDetected / ImportStarted--> ImportStarting
//! ImportStarting --ImportCompleted(true)--> Restoring --> ImportLocked
//! ImportStarting --ImportCompleted(false)--> Idle
//! ImportStarting --import timeout--> Idle
//! ImportLocked --lock timeout--> Idle
//! ```
//!
//! While the lock is held every period change request except the restoration
//! write is rejected, recorded, and followed by a re-assertion of the stored
//! value on the next scheduling tick.

mod lock;
mod session;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::notify::{Notification, NotificationKind, Notifier};
use crate::period::{ChangeOutcome, ChangeSource, Month, Period, PeriodChangeRecord};
use crate::refresh::{RefreshOperation, RefreshOutcome, RefreshRetrier};
use crate::runtime::spawn_detached;
use crate::signal::Signal;
use crate::store::{ImportMarker, PeriodStore};

pub use lock::ImportLock;
pub use session::{CoordinatorState, ImportSession, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorPolicy {
    /// How long the lock stays held after a successful import.
    pub lock_timeout_ms: u64,
    /// How long a session may wait for its completion signal.
    pub import_timeout_ms: u64,
}

impl Default for CoordinatorPolicy {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 3000,
            import_timeout_ms: 30_000,
        }
    }
}

impl CoordinatorPolicy {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_millis(self.import_timeout_ms)
    }
}

/// Point-in-time snapshot for debugging.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub state: CoordinatorState,
    pub current_period: Period,
    pub month: Month,
    pub session: Option<ImportSession>,
    pub lock_held: bool,
    pub lock_remaining_ms: Option<u64>,
    pub refreshing: bool,
    pub refresh_attempt: u32,
    pub render_key: u64,
    pub history_len: usize,
    pub last_import: Option<ImportMarker>,
    pub notification: Option<Notification>,
}

struct Inner {
    state: CoordinatorState,
    session: Option<ImportSession>,
    lock: ImportLock,
    next_session: u64,
}

pub struct ImportCoordinator {
    store: Arc<PeriodStore>,
    retrier: Arc<RefreshRetrier>,
    notifier: Arc<Notifier>,
    refresh: Arc<dyn RefreshOperation>,
    policy: CoordinatorPolicy,
    inner: Mutex<Inner>,
}

impl ImportCoordinator {
    pub fn new(
        store: Arc<PeriodStore>,
        retrier: Arc<RefreshRetrier>,
        notifier: Arc<Notifier>,
        refresh: Arc<dyn RefreshOperation>,
        policy: CoordinatorPolicy,
    ) -> Self {
        Self {
            store,
            retrier,
            notifier,
            refresh,
            policy,
            inner: Mutex::new(Inner {
                state: CoordinatorState::Idle,
                session: None,
                lock: ImportLock::new(),
                next_session: 0,
            }),
        }
    }

    /// Dispatch one bus signal.
    pub fn handle(self: &Arc<Self>, signal: Signal) {
        match signal {
            Signal::PeriodDetected { period } => {
                self.on_period_detected(period);
            }
            Signal::ImportStarted => {
                self.record_import_start();
            }
            Signal::ImportCompleted { success, session } => {
                self.complete_import(success, session);
            }
            Signal::PeriodChangeRequest { period, source } => {
                self.request_period_change(period, source);
            }
        }
    }

    pub fn current_period(&self) -> Period {
        self.store.get()
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.lock().state
    }

    pub fn store(&self) -> &Arc<PeriodStore> {
        &self.store
    }

    pub fn history(&self) -> Vec<PeriodChangeRecord> {
        self.store.history()
    }

    /// Begin a session without a detected period. Returns `None` when a
    /// session is already active.
    pub fn record_import_start(self: &Arc<Self>) -> Option<SessionId> {
        self.begin_session(None)
    }

    /// Begin a session, or attach the detected period to a session that has
    /// none yet. The detected period is never written to the store.
    pub fn on_period_detected(self: &Arc<Self>, period: Period) -> Option<SessionId> {
        self.begin_session(Some(period))
    }

    fn begin_session(self: &Arc<Self>, detected: Option<Period>) -> Option<SessionId> {
        let id = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if inner.state != CoordinatorState::Idle {
                if let (CoordinatorState::ImportStarting, Some(period), Some(session)) =
                    (inner.state, detected, inner.session.as_mut())
                {
                    if session.detected_period.is_none() {
                        session.detected_period = Some(period);
                        debug!(
                            session = %session.id,
                            detected = %period,
                            "detected period attached to session"
                        );
                        return Some(session.id);
                    }
                }
                warn!(
                    state = inner.state.as_str(),
                    detected = ?detected.map(Period::value),
                    "import already in progress; ignoring duplicate start"
                );
                return None;
            }

            inner.next_session += 1;
            let id = SessionId::from_raw(inner.next_session);
            let preceding = self.store.get();
            inner.session = Some(ImportSession::new(id, preceding, detected));
            inner.state = CoordinatorState::ImportStarting;
            info!(
                session = %id,
                preceding = %preceding,
                detected = ?detected.map(Period::value),
                "import started"
            );
            id
        };
        self.schedule_session_timeout(id);
        Some(id)
    }

    pub fn notify_import_outcome(self: &Arc<Self>, success: bool) {
        self.complete_import(success, None);
    }

    /// Handle a completion signal. A `tag` naming another session is ignored.
    pub fn complete_import(self: &Arc<Self>, success: bool, tag: Option<SessionId>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(session) = inner.session.clone() else {
            warn!(success, "import completion without an active session; ignoring");
            return;
        };
        if let Some(tag) = tag {
            if tag != session.id {
                warn!(
                    active = %session.id,
                    reported = %tag,
                    "completion for a stale session; ignoring"
                );
                return;
            }
        }

        let state = inner.state;
        match state {
            CoordinatorState::ImportStarting => {}
            CoordinatorState::ImportLocked | CoordinatorState::Restoring => {
                drop(guard);
                if success {
                    debug!(session = %session.id, "duplicate import completion");
                    self.restore_after_import();
                } else {
                    warn!(
                        session = %session.id,
                        "failure reported after successful completion; ignoring"
                    );
                }
                return;
            }
            CoordinatorState::Idle => {
                warn!(session = %session.id, "import completion while idle; ignoring");
                return;
            }
        }

        if !success {
            inner.session = None;
            inner.state = CoordinatorState::Idle;
            drop(guard);
            warn!(session = %session.id, period = %session.preceding_period, "import failed");
            self.notifier.show(
                format!("Import failed. Period {} is unchanged.", session.preceding_period),
                NotificationKind::Error,
                None,
            );
            return;
        }

        inner.state = CoordinatorState::Restoring;
        let generation = inner.lock.acquire(self.policy.lock_timeout());
        drop(guard);

        let outcome = self
            .store
            .restore(session.preceding_period, ChangeSource::ImportComplete);
        {
            let mut inner = self.inner.lock();
            if inner.state == CoordinatorState::Restoring {
                inner.state = CoordinatorState::ImportLocked;
            }
        }
        info!(
            session = %session.id,
            period = %session.preceding_period,
            detected = ?session.detected_period.map(Period::value),
            outcome = outcome.as_str(),
            lock_ms = self.policy.lock_timeout_ms,
            "import completed; period restored"
        );

        ImportMarker::now(session.preceding_period, self.store.month())
            .save(self.store.storage().as_ref());
        self.schedule_lock_release(generation);
        self.start_refresh();
        self.notifier.show(
            format!("Import completed. Showing period {}.", session.preceding_period),
            NotificationKind::Success,
            None,
        );
    }

    /// Write the active session's preceding period back to the store.
    /// Repeated calls are recorded as no-ops.
    pub fn restore_after_import(&self) -> Option<ChangeOutcome> {
        let preceding = {
            let inner = self.inner.lock();
            inner.session.as_ref().map(|s| s.preceding_period)?
        };
        Some(self.store.restore(preceding, ChangeSource::ImportComplete))
    }

    /// Admit or reject a period change. Returns whether the value changed.
    pub fn request_period_change(self: &Arc<Self>, period: i64, source: ChangeSource) -> bool {
        let locked = self.inner.lock().lock.is_held();
        if locked && source != ChangeSource::ImportComplete {
            warn!(
                requested = period,
                current = %self.store.get(),
                source = %source,
                "period change blocked during import"
            );
            self.store.record_blocked(period);
            let store = Arc::clone(&self.store);
            let scheduled = spawn_detached(async move {
                tokio::task::yield_now().await;
                store.reassert();
            })
            .is_some();
            if !scheduled {
                self.store.reassert();
            }
            return false;
        }
        self.store.set(period, source)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let inner = self.inner.lock();
        Diagnostics {
            state: inner.state,
            current_period: self.store.get(),
            month: self.store.month(),
            session: inner.session.clone(),
            lock_held: inner.lock.is_held(),
            lock_remaining_ms: inner.lock.remaining().map(|d| d.as_millis() as u64),
            refreshing: self.retrier.is_refreshing(),
            refresh_attempt: self.retrier.current_attempt(),
            render_key: self.retrier.render_key(),
            history_len: self.store.history_len(),
            last_import: ImportMarker::peek(self.store.storage().as_ref()),
            notification: self.notifier.current(),
        }
    }

    fn schedule_lock_release(self: &Arc<Self>, generation: u64) {
        let coordinator = Arc::clone(self);
        let timeout = self.policy.lock_timeout();
        let scheduled = spawn_detached(async move {
            sleep(timeout).await;
            coordinator.release_lock(generation);
        })
        .is_some();
        if !scheduled {
            warn!("no async runtime; releasing import lock immediately");
            self.release_lock(generation);
        }
    }

    fn release_lock(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if !inner.lock.release(generation) {
            return;
        }
        let finished = inner.session.take();
        inner.state = CoordinatorState::Idle;
        info!(session = ?finished.map(|s| s.id.as_u64()), "import lock released");
    }

    fn schedule_session_timeout(self: &Arc<Self>, id: SessionId) {
        let coordinator = Arc::clone(self);
        let timeout = self.policy.import_timeout();
        let scheduled = spawn_detached(async move {
            sleep(timeout).await;
            coordinator.abandon_session(id);
        })
        .is_some();
        if !scheduled {
            debug!(session = %id, "no async runtime; import session will not time out");
        }
    }

    fn abandon_session(&self, id: SessionId) {
        let mut inner = self.inner.lock();
        let waiting = inner.state == CoordinatorState::ImportStarting
            && inner.session.as_ref().map(|s| s.id) == Some(id);
        if !waiting {
            return;
        }
        inner.session = None;
        inner.state = CoordinatorState::Idle;
        warn!(session = %id, "import completion never observed; session abandoned");
    }

    fn start_refresh(&self) {
        let Some(chain) = self.retrier.run(Arc::clone(&self.refresh)) else {
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        spawn_detached(async move {
            if let Ok(RefreshOutcome::Exhausted { attempts, .. }) = chain.await {
                notifier.show(
                    format!(
                        "Data reload failed after {} attempts. Showing previously loaded data.",
                        attempts
                    ),
                    NotificationKind::Error,
                    None,
                );
            }
        });
    }
}
