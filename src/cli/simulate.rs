//! Stand-in refresh operation for replays.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use crate::error::RefreshError;
use crate::refresh::RefreshOperation;

/// Fails the first `failures` calls, then succeeds.
pub struct SimulatedRefresh {
    remaining_failures: AtomicU32,
    calls: AtomicU32,
    latency: Duration,
}

impl SimulatedRefresh {
    pub fn new(failures: u32, latency: Duration) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            latency,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshOperation for SimulatedRefresh {
    async fn refresh(&self) -> Result<(), RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.latency).await;
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        debug!(call, failing, "simulated refresh");
        if failing {
            Err(RefreshError::new(format!("simulated failure on call {}", call)))
        } else {
            Ok(())
        }
    }
}
