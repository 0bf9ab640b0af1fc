//! Property-based tests for handle and host invariants.

mod common;
mod factories;

use std::rc::Rc;

use common::{Tracker, Release};
use deferral::{dispose_all_if_supported, Dispose, DisposeHost, DisposeState, Lazy, LazyError};
use factories::counting;
use proptest::prelude::*;

fn arb_release() -> impl Strategy<Value = Release> {
    prop_oneof![
        4 => Just(Release::Clean),
        1 => Just(Release::Fail),
        1 => Just(Release::Panic),
    ]
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Get,
    Build,
    Has,
    Read,
    Write,
    Dispose,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Get),
        Just(Op::Build),
        Just(Op::Has),
        Just(Op::Read),
        Just(Op::Write),
        Just(Op::Dispose),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Model {
    Fresh,
    Built,
    Faulted,
    Disposed,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Ok,
    Disposed,
    Faulted,
}

fn classify<T>(result: &Result<T, LazyError>) -> Outcome {
    match result {
        Ok(_) => Outcome::Ok,
        Err(LazyError::Disposed(_)) => Outcome::Disposed,
        Err(LazyError::Faulted(_)) => Outcome::Faulted,
        Err(other) => panic!("unexpected error: {other}"),
    }
}

const fn expected_access(model: Model, fails: bool) -> (Outcome, Model) {
    match model {
        Model::Disposed => (Outcome::Disposed, Model::Disposed),
        Model::Faulted => (Outcome::Faulted, Model::Faulted),
        Model::Built => (Outcome::Ok, Model::Built),
        Model::Fresh if fails => (Outcome::Faulted, Model::Faulted),
        Model::Fresh => (Outcome::Ok, Model::Built),
    }
}

proptest! {
    #[test]
    fn handle_follows_its_state_machine(
        fails in any::<bool>(),
        ops in prop::collection::vec(arb_op(), 0..24),
    ) {
        let (calls, factory) = counting(move || if fails { Err("refused") } else { Ok(0_u32) });
        let lazy = Lazy::try_new(factory);
        let mut model = Model::Fresh;
        let mut writes = 0_u32;

        for op in ops {
            match op {
                Op::Get => {
                    let expected = match model {
                        Model::Disposed => Outcome::Disposed,
                        Model::Faulted => Outcome::Faulted,
                        Model::Fresh | Model::Built => Outcome::Ok,
                    };
                    prop_assert_eq!(classify(&lazy.get()), expected);
                }
                Op::Build => {
                    let result = lazy.build();
                    match model {
                        Model::Disposed => prop_assert_eq!(classify(&result), Outcome::Disposed),
                        Model::Faulted => prop_assert_eq!(classify(&result), Outcome::Faulted),
                        Model::Built => prop_assert_eq!(result, Ok(false)),
                        Model::Fresh => {
                            prop_assert_eq!(result, Ok(true));
                            model = if fails { Model::Faulted } else { Model::Built };
                        }
                    }
                }
                Op::Has => prop_assert_eq!(lazy.has(), model == Model::Built),
                Op::Read => {
                    let (expected, next) = expected_access(model, fails);
                    let result = lazy.resolve().map(|value| *value);
                    prop_assert_eq!(classify(&result), expected);
                    if let Ok(value) = result {
                        prop_assert_eq!(value, writes);
                    }
                    model = next;
                }
                Op::Write => {
                    let (expected, next) = expected_access(model, fails);
                    let result = lazy.get().and_then(|proxy| proxy.with_mut(|value| *value += 1));
                    prop_assert_eq!(classify(&result), expected);
                    if result.is_ok() {
                        writes += 1;
                    }
                    model = next;
                }
                Op::Dispose => {
                    prop_assert_eq!(lazy.dispose(), Ok(()));
                    model = Model::Disposed;
                }
            }

            prop_assert!(calls.get() <= 1);
            prop_assert_eq!(lazy.disposed(), model == Model::Disposed);
        }

        let forced = model == Model::Built || model == Model::Faulted;
        if forced {
            prop_assert_eq!(calls.get(), 1);
        }
        if model == Model::Fresh {
            prop_assert_eq!(calls.get(), 0);
        }
    }

    #[test]
    fn host_releases_every_child_exactly_once(
        releases in prop::collection::vec(arb_release(), 0..16),
        repeats in 1usize..4,
    ) {
        let trackers: Vec<Rc<Tracker>> = releases.iter().map(|release| Tracker::new(*release)).collect();
        let host = DisposeHost::new();
        host.register_for_dispose(trackers.iter().map(|tracker| Rc::clone(tracker) as Rc<dyn Dispose>))
            .unwrap();

        for _ in 0..repeats {
            prop_assert_eq!(host.dispose(), Ok(()));
        }

        prop_assert!(host.disposed());
        for tracker in &trackers {
            prop_assert_eq!(tracker.calls(), 1);
        }
    }

    #[test]
    fn batch_disposal_reports_one_error_per_failing_item(
        releases in prop::collection::vec(arb_release(), 0..16),
    ) {
        let trackers: Vec<Rc<Tracker>> = releases.iter().map(|release| Tracker::new(*release)).collect();

        let errors = dispose_all_if_supported(&trackers);

        let expected = releases.iter().filter(|release| **release != Release::Clean).count();
        prop_assert_eq!(errors.len(), expected);
        prop_assert!(trackers.iter().all(|tracker| tracker.disposed()));
    }
}
