//! Property-based tests for the restoration guarantee

use async_trait::async_trait;
use periodguard::coordinator::{CoordinatorPolicy, CoordinatorState, ImportCoordinator};
use periodguard::error::RefreshError;
use periodguard::notify::{MemorySink, NotificationPolicy, Notifier};
use periodguard::period::{ChangeSource, Period, MAX_PERIOD, MIN_PERIOD};
use periodguard::refresh::{RefreshOperation, RefreshRetrier, RetryPolicy};
use periodguard::store::{MemoryStorage, PeriodStore, DEFAULT_HISTORY_CAPACITY};
use proptest::prelude::*;
use std::sync::Arc;

struct NoopRefresh;

#[async_trait]
impl RefreshOperation for NoopRefresh {
    async fn refresh(&self) -> Result<(), RefreshError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Detect(i64),
    Start,
    Complete(bool),
    Change(i64, ChangeSource),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let source = prop_oneof![Just(ChangeSource::Manual), Just(ChangeSource::Event)];
    prop_oneof![
        (i64::from(MIN_PERIOD)..=i64::from(MAX_PERIOD)).prop_map(Op::Detect),
        Just(Op::Start),
        any::<bool>().prop_map(Op::Complete),
        ((1990i64..2110), source).prop_map(|(p, s)| Op::Change(p, s)),
    ]
}

/// Reference model of the visible period while no timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Model {
    Idle,
    Starting { preceding: i64 },
    Locked,
}

fn coordinator(initial: i64) -> Arc<ImportCoordinator> {
    let store = Arc::new(PeriodStore::with_initial(
        Arc::new(MemoryStorage::new()),
        Period::new(initial).unwrap(),
        DEFAULT_HISTORY_CAPACITY,
    ));
    let notifier = Arc::new(Notifier::new(
        Arc::new(MemorySink::new()),
        NotificationPolicy::default(),
    ));
    Arc::new(ImportCoordinator::new(
        store,
        Arc::new(RefreshRetrier::new(RetryPolicy::default())),
        notifier,
        Arc::new(NoopRefresh),
        CoordinatorPolicy::default(),
    ))
}

/// While no lock timeout elapses, the visible period only moves through
/// admitted change requests, and a completed import always lands back on the
/// period that preceded it.
#[test]
fn test_import_never_moves_visible_period() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(2000i64..=2100, proptest::collection::vec(op_strategy(), 1..60)),
            |(initial, ops)| {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .start_paused(true)
                    .build()
                    .unwrap();
                let _guard = rt.enter();

                let coordinator = coordinator(initial);
                let mut model = Model::Idle;
                let mut expected = initial;

                for op in ops {
                    match op {
                        Op::Detect(p) => {
                            coordinator.on_period_detected(Period::new(p).unwrap());
                            if model == Model::Idle {
                                model = Model::Starting { preceding: expected };
                            }
                        }
                        Op::Start => {
                            coordinator.record_import_start();
                            if model == Model::Idle {
                                model = Model::Starting { preceding: expected };
                            }
                        }
                        Op::Complete(success) => {
                            coordinator.notify_import_outcome(success);
                            if let Model::Starting { preceding } = model {
                                if success {
                                    expected = preceding;
                                    model = Model::Locked;
                                } else {
                                    model = Model::Idle;
                                }
                            }
                        }
                        Op::Change(p, source) => {
                            let admitted = coordinator.request_period_change(p, source);
                            if model == Model::Locked {
                                prop_assert!(!admitted);
                            } else if (i64::from(MIN_PERIOD)..=i64::from(MAX_PERIOD)).contains(&p) {
                                expected = p;
                            }
                        }
                    }

                    prop_assert_eq!(i64::from(coordinator.current_period().value()), expected);
                    prop_assert!(coordinator.history().len() <= DEFAULT_HISTORY_CAPACITY);
                    let state = coordinator.state();
                    match model {
                        Model::Idle => prop_assert_eq!(state, CoordinatorState::Idle),
                        Model::Starting { .. } => {
                            prop_assert_eq!(state, CoordinatorState::ImportStarting)
                        }
                        Model::Locked => prop_assert_eq!(state, CoordinatorState::ImportLocked),
                    }
                }
                Ok(())
            },
        )
        .unwrap();
}
