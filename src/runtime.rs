//! Guard runtime
//!
//! Wires the store, coordinator, retrier and notifier together and runs the
//! ordered event loop that feeds bus signals to the coordinator one at a time.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::GuardConfig;
use crate::coordinator::{Diagnostics, ImportCoordinator};
use crate::error::GuardError;
use crate::notify::{NotificationKind, NotificationSink, Notifier};
use crate::period::{ChangeSource, Period, PeriodChangeRecord};
use crate::reconcile::{PeriodView, Reconciler};
use crate::refresh::{RefreshOperation, RefreshRetrier};
use crate::signal::{LogLineAdapter, Signal, SignalBus, SignalReceiver};
use crate::store::persistence::SessionStorage;
use crate::store::PeriodStore;

/// Spawn onto the ambient tokio runtime. `None` when called outside one.
pub(crate) fn spawn_detached<F>(future: F) -> Option<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::runtime::Handle::try_current()
        .ok()
        .map(|handle| handle.spawn(future))
}

pub struct GuardRuntime {
    handle: GuardHandle,
    config: GuardConfig,
    task: JoinHandle<()>,
}

/// Cloneable entry point for hosts.
#[derive(Clone)]
pub struct GuardHandle {
    bus: SignalBus,
    coordinator: Arc<ImportCoordinator>,
    notifier: Arc<Notifier>,
    adapter: LogLineAdapter,
    last_emitted: Arc<AtomicU64>,
    processed: watch::Receiver<u64>,
}

impl GuardRuntime {
    /// Start with a store seeded from `storage`. Must be called inside a tokio
    /// runtime.
    pub fn start(
        config: GuardConfig,
        storage: Arc<dyn SessionStorage>,
        refresh: Arc<dyn RefreshOperation>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(PeriodStore::open(storage, config.history.capacity));
        Self::start_with_store(config, store, refresh, sink)
    }

    pub fn start_with_store(
        config: GuardConfig,
        store: Arc<PeriodStore>,
        refresh: Arc<dyn RefreshOperation>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let retrier = Arc::new(RefreshRetrier::new(config.refresh));
        let notifier = Arc::new(Notifier::new(sink, config.notifications));
        let coordinator = Arc::new(ImportCoordinator::new(
            store,
            retrier,
            notifier.clone(),
            refresh,
            config.coordination,
        ));

        let (bus, rx) = SignalBus::new_pair();
        let (processed_tx, processed_rx) = watch::channel(0u64);
        let task = tokio::spawn(run_event_loop(rx, coordinator.clone(), processed_tx));
        info!(
            period = %coordinator.current_period(),
            lock_timeout_ms = config.coordination.lock_timeout_ms,
            "guard runtime started"
        );

        Self {
            handle: GuardHandle {
                bus,
                coordinator,
                notifier,
                adapter: LogLineAdapter::new(),
                last_emitted: Arc::new(AtomicU64::new(0)),
                processed: processed_rx,
            },
            config,
            task,
        }
    }

    pub fn handle(&self) -> GuardHandle {
        self.handle.clone()
    }

    /// Attach a view kept in sync with the store.
    pub fn attach_view(&self, view: Arc<dyn PeriodView>) -> Arc<Reconciler> {
        let reconciler = Arc::new(Reconciler::new(
            self.handle.coordinator.store().clone(),
            view,
            self.config.reconcile,
        ));
        reconciler.attach();
        reconciler.reconcile_now();
        reconciler
    }

    /// Process everything already emitted, then stop the event loop.
    pub async fn shutdown(self) {
        self.handle.wait_idle().await;
        self.task.abort();
        let _ = self.task.await;
        debug!("guard runtime stopped");
    }
}

async fn run_event_loop(
    mut rx: SignalReceiver,
    coordinator: Arc<ImportCoordinator>,
    processed: watch::Sender<u64>,
) {
    while let Some(envelope) = rx.recv().await {
        debug!(seq = envelope.seq, kind = envelope.signal.kind(), "dispatching signal");
        coordinator.handle(envelope.signal);
        processed.send_replace(envelope.seq);
    }
    debug!("signal bus closed");
}

impl GuardHandle {
    /// Queue a signal for the event loop.
    pub fn emit(&self, signal: Signal) -> Result<u64, GuardError> {
        let seq = self.bus.emit(signal)?;
        self.last_emitted.fetch_max(seq, Ordering::SeqCst);
        Ok(seq)
    }

    /// Translate a host log line or JSON event and queue the result.
    /// Returns `None` when the input carries no signal.
    pub fn emit_raw(&self, raw: &str) -> Result<Option<u64>, GuardError> {
        match self.adapter.translate_raw(raw) {
            Some(signal) => self.emit(signal).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve once every signal emitted through this handle (or its clones)
    /// has been handled.
    pub async fn wait_idle(&self) {
        let target = self.last_emitted.load(Ordering::SeqCst);
        let mut processed = self.processed.clone();
        // An error means the loop is gone; nothing further will be processed.
        let _ = processed.wait_for(|seq| *seq >= target).await;
    }

    pub fn request_period_change(&self, period: i64, source: ChangeSource) -> bool {
        self.coordinator.request_period_change(period, source)
    }

    pub fn current_period(&self) -> Period {
        self.coordinator.current_period()
    }

    pub fn history(&self) -> Vec<PeriodChangeRecord> {
        self.coordinator.history()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.coordinator.diagnostics()
    }

    pub fn notify(&self, message: impl Into<String>, kind: NotificationKind) -> u64 {
        self.notifier.show(message, kind, None)
    }

    pub fn coordinator(&self) -> &Arc<ImportCoordinator> {
        &self.coordinator
    }
}
