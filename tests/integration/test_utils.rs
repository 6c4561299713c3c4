//! Shared fixtures for integration tests.

use async_trait::async_trait;
use periodguard::config::GuardConfig;
use periodguard::error::RefreshError;
use periodguard::notify::MemorySink;
use periodguard::period::Period;
use periodguard::refresh::RefreshOperation;
use periodguard::runtime::GuardRuntime;
use periodguard::store::persistence::SessionStorage;
use periodguard::store::{MemoryStorage, PeriodStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Refresh that fails its first `failures` calls.
pub struct ScriptedRefresh {
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedRefresh {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshOperation for ScriptedRefresh {
    async fn refresh(&self) -> Result<(), RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(RefreshError::new(format!("call {} failed", call)))
        } else {
            Ok(())
        }
    }
}

pub struct Harness {
    pub runtime: GuardRuntime,
    pub storage: Arc<MemoryStorage>,
    pub sink: Arc<MemorySink>,
    pub refresh: Arc<ScriptedRefresh>,
}

/// Runtime over in-memory storage starting at `initial`.
pub fn harness(initial: i64, refresh_failures: u32) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let sink = Arc::new(MemorySink::new());
    let refresh = Arc::new(ScriptedRefresh::new(refresh_failures));
    let config = GuardConfig::default();
    let store = PeriodStore::with_initial(
        storage.clone() as Arc<dyn SessionStorage>,
        Period::new(initial).unwrap(),
        config.history.capacity,
    );
    let runtime =
        GuardRuntime::start_with_store(config, Arc::new(store), refresh.clone(), sink.clone());
    Harness {
        runtime,
        storage,
        sink,
        refresh,
    }
}
