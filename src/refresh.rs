//! Refresh Retrier
//!
//! Reloads page data after an import. A chain of attempts runs sequentially with
//! exponential backoff; a second `run` while a chain is pending is dropped, not
//! queued. Failures never propagate to the caller.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::RefreshError;
use crate::runtime::spawn_detached;

const EVENT_CAPACITY: usize = 32;

/// Host-supplied data reload.
#[async_trait]
pub trait RefreshOperation: Send + Sync {
    async fn refresh(&self) -> Result<(), RefreshError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay_ms: u64,
    /// Additional attempts after the first one.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed { attempts: u32, render_key: u64 },
    Exhausted { attempts: u32, last_error: String },
    /// Another chain was already pending.
    Dropped,
}

/// Published once per finished chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Completed { render_key: u64 },
    Exhausted { attempts: u32, last_error: String },
}

/// Per-chain retry bookkeeping.
struct RetryState {
    attempt: u32,
    last_error: Option<RefreshError>,
}

pub struct RefreshRetrier {
    policy: RetryPolicy,
    in_flight: AtomicBool,
    attempt: AtomicU32,
    render_key: AtomicU64,
    events: broadcast::Sender<RefreshEvent>,
}

/// Clears the re-entrancy flag even when the chain's task is aborted.
struct InFlightGuard<'a>(&'a RefreshRetrier);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.attempt.store(0, Ordering::SeqCst);
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl RefreshRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            policy,
            in_flight: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
            render_key: AtomicU64::new(0),
            events,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 0-based index of the attempt currently running (0 when idle).
    pub fn current_attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Bumped on every successful chain; views key their render on it.
    pub fn render_key(&self) -> u64 {
        self.render_key.load(Ordering::SeqCst)
    }

    /// Fire-and-forget. Returns `None` when a chain is already pending or no
    /// async runtime is available to drive one.
    pub fn run(
        self: &Arc<Self>,
        operation: Arc<dyn RefreshOperation>,
    ) -> Option<JoinHandle<RefreshOutcome>> {
        if self.is_refreshing() {
            debug!("refresh already pending; dropping request");
            return None;
        }
        let retrier = Arc::clone(self);
        let chain = spawn_detached(async move { retrier.execute(operation.as_ref()).await });
        if chain.is_none() {
            warn!("no async runtime; skipping data refresh");
        }
        chain
    }

    /// Run one chain to its end.
    pub async fn execute(&self, operation: &dyn RefreshOperation) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("refresh already pending; dropping request");
            return RefreshOutcome::Dropped;
        }
        let _guard = InFlightGuard(self);
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
        };

        loop {
            self.attempt.store(state.attempt, Ordering::SeqCst);
            info!(
                attempt = state.attempt + 1,
                total = self.policy.total_attempts(),
                "refreshing data"
            );
            match operation.refresh().await {
                Ok(()) => {
                    let render_key = self.render_key.fetch_add(1, Ordering::SeqCst) + 1;
                    let attempts = state.attempt + 1;
                    info!(attempts, render_key, "refresh complete");
                    let _ = self.events.send(RefreshEvent::Completed { render_key });
                    return RefreshOutcome::Completed {
                        attempts,
                        render_key,
                    };
                }
                Err(err) => {
                    if state.attempt < self.policy.max_retries {
                        let delay = self.policy.delay_for(state.attempt);
                        warn!(
                            attempt = state.attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "refresh failed; retrying"
                        );
                        state.last_error = Some(err);
                        state.attempt += 1;
                        sleep(delay).await;
                        continue;
                    }
                    let attempts = state.attempt + 1;
                    state.last_error = Some(err);
                    let last_error = state
                        .last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    error!(attempts, error = %last_error, "refresh retries exhausted");
                    let _ = self.events.send(RefreshEvent::Exhausted {
                        attempts,
                        last_error: last_error.clone(),
                    });
                    return RefreshOutcome::Exhausted {
                        attempts,
                        last_error,
                    };
                }
            }
        }
    }
}
