//! Session storage behaviour across restarts.

use periodguard::period::{ChangeSource, Month, Period};
use periodguard::store::marker::MARKER_TTL_MS;
use periodguard::store::persistence::{SessionStorage, KEY_FISCAL_YEAR, KEY_LAST_IMPORT};
use periodguard::store::{ImportMarker, PeriodStore, SledStorage, DEFAULT_HISTORY_CAPACITY};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn period_and_history_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let storage: Arc<dyn SessionStorage> = Arc::new(SledStorage::open(dir.path()).unwrap());
        let store = PeriodStore::with_initial(
            storage,
            Period::new(2024).unwrap(),
            DEFAULT_HISTORY_CAPACITY,
        );
        assert!(store.set(2023, ChangeSource::Manual));
        assert!(store.set_month(7));
    }

    let storage: Arc<dyn SessionStorage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    let raw = storage.get(KEY_FISCAL_YEAR).unwrap().unwrap();
    assert_eq!(raw, json!({ "fiscalYear": 2023 }));

    let store = PeriodStore::open(storage, DEFAULT_HISTORY_CAPACITY);
    assert_eq!(store.get().value(), 2023);
    assert_eq!(store.month().value(), 7);
    let history = store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_period.value(), 2024);
    assert_eq!(history[0].to_period, 2023);
}

#[test]
fn malformed_period_falls_back_to_current_year() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn SessionStorage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    storage
        .set(KEY_FISCAL_YEAR, &json!({ "fiscalYear": "twenty" }))
        .unwrap();

    let store = PeriodStore::open(storage, DEFAULT_HISTORY_CAPACITY);
    assert_eq!(store.get(), Period::current());
}

#[test]
fn persisted_history_is_trimmed_to_capacity() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn SessionStorage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    {
        let store = PeriodStore::with_initial(storage.clone(), Period::new(2024).unwrap(), 20);
        for year in 2030..2040 {
            store.set(year, ChangeSource::Manual);
        }
    }
    let store = PeriodStore::open(storage, 4);
    let history = store.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].to_period, 2039);
}

#[test]
fn import_marker_expires_after_a_day() {
    let dir = TempDir::new().unwrap();
    let storage = SledStorage::open(dir.path()).unwrap();
    let marker = ImportMarker {
        timestamp: 1_700_000_000_000,
        year: Period::new(2024).unwrap(),
        month: Month::new(3).unwrap(),
    };
    assert!(marker.save(&storage));

    let stored = storage.get(KEY_LAST_IMPORT).unwrap().unwrap();
    assert_eq!(stored["year"], 2024);
    assert_eq!(stored["month"], 3);

    let fresh = ImportMarker::load_at(&storage, marker.timestamp + MARKER_TTL_MS - 1);
    assert_eq!(fresh, Some(marker));

    assert!(ImportMarker::load_at(&storage, marker.timestamp + MARKER_TTL_MS).is_none());
    assert!(storage.get(KEY_LAST_IMPORT).unwrap().is_none());
}
