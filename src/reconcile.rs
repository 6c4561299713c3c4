//! View reconciliation
//!
//! Keeps whatever renders the period selector in line with the store. Ordinary
//! changes are debounced on the trailing edge; re-assertions are applied at once
//! so a value rendered early by the host is overwritten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::period::Period;
use crate::runtime::spawn_detached;
use crate::store::{PeriodChanged, PeriodStore};

/// A rendered period selector.
pub trait PeriodView: Send + Sync {
    fn rendered_period(&self) -> Option<Period>;

    fn render_period(&self, period: Period);

    /// Hide duplicate selectors the host may have injected. Returns how many
    /// were hidden.
    fn hide_competing_selectors(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub debounce_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

pub struct Reconciler {
    store: Arc<PeriodStore>,
    view: Arc<dyn PeriodView>,
    debounce: Duration,
    generation: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: Arc<PeriodStore>,
        view: Arc<dyn PeriodView>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            view,
            debounce: Duration::from_millis(config.debounce_ms),
            generation: AtomicU64::new(0),
        }
    }

    /// Subscribe to the store. The subscription holds only a weak reference.
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.store.subscribe(Arc::new(move |change: &PeriodChanged| {
            let Some(reconciler) = weak.upgrade() else {
                return;
            };
            if change.reasserted {
                reconciler.reconcile_now();
            } else {
                reconciler.request();
            }
        }));
    }

    /// Apply the stored period to the view. Returns whether the view changed.
    pub fn reconcile_now(&self) -> bool {
        let period = self.store.get();
        let hidden = self.view.hide_competing_selectors();
        if hidden > 0 {
            debug!(hidden, "hid competing period selectors");
        }
        if self.view.rendered_period() == Some(period) {
            return false;
        }
        debug!(
            rendered = ?self.view.rendered_period().map(Period::value),
            period = %period,
            "reconciling period view"
        );
        self.view.render_period(period);
        true
    }

    /// Schedule a reconciliation after the debounce window. Only the last
    /// request inside a window runs.
    pub fn request(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let reconciler = Arc::clone(self);
        let delay = self.debounce;
        let scheduled = spawn_detached(async move {
            sleep(delay).await;
            if reconciler.generation.load(Ordering::SeqCst) == generation {
                reconciler.reconcile_now();
            }
        });
        if scheduled.is_none() {
            self.reconcile_now();
        }
    }
}

/// In-memory view that records every render.
#[derive(Debug, Default)]
pub struct MemoryView {
    renders: Mutex<Vec<Period>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the host rendering a value on its own.
    pub fn force(&self, period: Period) {
        self.renders.lock().push(period);
    }

    pub fn renders(&self) -> Vec<Period> {
        self.renders.lock().clone()
    }
}

impl PeriodView for MemoryView {
    fn rendered_period(&self) -> Option<Period> {
        self.renders.lock().last().copied()
    }

    fn render_period(&self, period: Period) {
        self.renders.lock().push(period);
    }
}
