//! Period mutation gate with generation-checked auto-release.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ImportLock {
    generation: u64,
    expires_at: Option<Instant>,
}

impl ImportLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take (or re-take) the lock. The returned generation must be presented to
    /// [`ImportLock::release`]; a stale generation cannot release a newer hold.
    pub fn acquire(&mut self, timeout: Duration) -> u64 {
        self.generation += 1;
        self.expires_at = Some(Instant::now() + timeout);
        self.generation
    }

    pub fn release(&mut self, generation: u64) -> bool {
        if self.expires_at.is_none() || generation != self.generation {
            return false;
        }
        self.expires_at = None;
        true
    }

    pub fn is_held(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}
