//! Integration tests for instrumented memoized selectors
//!
//! Covers memoization correctness, change-index accuracy, hit silence,
//! name resolution and the live tracking toggle.

use statemeter::config::PerfConfig;
use statemeter::event::{ComputationTiming, PerfEvent, Topic};
use statemeter::notify::{Notice, NoticeLog};
use statemeter::runtime::PerfRuntime;
use statemeter::selector::SelectorOptions;
use statemeter::Subscription;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct TodoState {
    todos: Arc<Vec<String>>,
    filter: Arc<String>,
}

fn record_computations(
    runtime: &PerfRuntime,
) -> (Arc<Mutex<Vec<ComputationTiming>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = runtime
        .channel()
        .subscribe(Topic::ComputationTiming, move |event| {
            if let PerfEvent::ComputationTiming(timing) = event {
                sink.lock().unwrap().push(timing.clone());
            }
        });
    (events, subscription)
}

fn visible_todos(todos: &Arc<Vec<String>>, filter: &Arc<String>) -> Vec<String> {
    todos
        .iter()
        .filter(|todo| todo.contains(filter.as_str()))
        .cloned()
        .collect()
}

#[test]
fn test_scenario_two_inputs_second_changes() {
    let runtime = PerfRuntime::default();
    let (events, _sub) = record_computations(&runtime);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let selector = runtime.create_named_selector(
        "sumPair",
        (|s: &(i32, i32)| s.0, |s: &(i32, i32)| s.1),
        move |a: &i32, b: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            a + b
        },
    );

    assert_eq!(selector.select(&(1, 10)), 11);
    assert_eq!(selector.select(&(1, 10)), 11);
    assert_eq!(selector.select(&(1, 20)), 21);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].changed_index, None);
    assert_eq!(events[1].changed_index, Some(1));
    assert!(events.iter().all(|e| e.recomputation && e.name == "sumPair"));
}

#[test]
fn test_change_index_tracks_reference_identity() {
    let runtime = PerfRuntime::default();
    let (events, _sub) = record_computations(&runtime);
    let selector = runtime.create_selector(
        (|s: &TodoState| s.todos.clone(), |s: &TodoState| s.filter.clone()),
        visible_todos,
        SelectorOptions::default(),
    );

    let state = TodoState {
        todos: Arc::new(vec!["write docs".to_string(), "fix bug".to_string()]),
        filter: Arc::new("fix".to_string()),
    };
    assert_eq!(selector.select(&state), vec!["fix bug".to_string()]);

    // Equal contents behind a new allocation still count as a change.
    let new_todos = TodoState {
        todos: Arc::new(state.todos.as_ref().clone()),
        ..state.clone()
    };
    selector.select(&new_todos);

    let new_filter = TodoState {
        filter: Arc::new("write".to_string()),
        ..new_todos.clone()
    };
    assert_eq!(selector.select(&new_filter), vec!["write docs".to_string()]);

    let indices: Vec<_> = events.lock().unwrap().iter().map(|e| e.changed_index).collect();
    assert_eq!(indices, vec![None, Some(0), Some(1)]);
    assert_eq!(selector.name(), "visible_todos");
}

#[test]
fn test_hits_are_silent() {
    let runtime = PerfRuntime::default();
    let (events, _sub) = record_computations(&runtime);
    let selector = runtime.create_selector(
        (|s: &TodoState| s.todos.clone(),),
        |todos: &Arc<Vec<String>>| todos.len(),
        SelectorOptions::named("todoCount"),
    );
    let state = TodoState {
        todos: Arc::new(vec!["a".to_string()]),
        filter: Arc::new(String::new()),
    };

    for _ in 0..10 {
        assert_eq!(selector.select(&state), 1);
    }
    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(selector.recomputations(), 1);
}

#[test]
fn test_tracking_disabled_publishes_nothing_but_still_memoizes() {
    let runtime = PerfRuntime::default();
    runtime.config().set_selector_tracking(false);
    let (events, _sub) = record_computations(&runtime);
    let selector = runtime.create_named_selector("double", (|s: &i32| *s,), |v: &i32| v * 2);

    assert_eq!(selector.select(&4), 8);
    assert_eq!(selector.select(&4), 8);
    assert_eq!(selector.select(&5), 10);
    assert_eq!(selector.recomputations(), 2);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_toggling_tracking_does_not_emit_spurious_events() {
    let runtime = PerfRuntime::default();
    let (events, _sub) = record_computations(&runtime);
    let selector = runtime.create_named_selector("double", (|s: &i32| *s,), |v: &i32| v * 2);

    selector.select(&1);
    runtime.config().set_selector_tracking(false);
    selector.select(&2);
    runtime.config().set_selector_tracking(true);
    // Same input as the untracked call: a hit, so nothing is published.
    selector.select(&2);
    selector.select(&3);

    let indices: Vec<_> = events.lock().unwrap().iter().map(|e| e.changed_index).collect();
    assert_eq!(indices, vec![None, Some(0)]);
}

#[test]
fn test_clear_cache_reports_indeterminate_index() {
    let runtime = PerfRuntime::default();
    let (events, _sub) = record_computations(&runtime);
    let selector = runtime.create_named_selector("identity", (|s: &u8| *s,), |v: &u8| *v);

    selector.select(&1);
    selector.clear_cache();
    selector.select(&1);

    let indices: Vec<_> = events.lock().unwrap().iter().map(|e| e.changed_index).collect();
    assert_eq!(indices, vec![None, None]);
}

#[test]
fn test_slow_computation_notice() {
    let notices = NoticeLog::new();
    let runtime = PerfRuntime::with_notifier(PerfConfig::default(), Arc::new(notices.clone()));
    runtime.config().set_slow_computation_threshold_ms(1.0);

    let selector = runtime.create_named_selector("sleepy", (|s: &u64| *s,), |ms: &u64| {
        std::thread::sleep(std::time::Duration::from_millis(*ms));
        *ms
    });

    selector.select(&0);
    selector.select(&10);

    let slow: Vec<_> = notices
        .notices()
        .into_iter()
        .filter(|n| matches!(n, Notice::SlowComputation { .. }))
        .collect();
    assert!(!slow.is_empty());
    match &slow[slow.len() - 1] {
        Notice::SlowComputation {
            name,
            duration_ms,
            threshold_ms,
        } => {
            assert_eq!(name, "sleepy");
            assert!(*duration_ms >= 10.0);
            assert_eq!(*threshold_ms, 1.0);
        }
        other => panic!("unexpected notice {:?}", other),
    }
}

#[test]
fn test_extractor_time_is_not_attributed_to_combiner() {
    let notices = NoticeLog::new();
    let runtime = PerfRuntime::with_notifier(PerfConfig::default(), Arc::new(notices.clone()));
    let (events, _sub) = record_computations(&runtime);

    let selector = runtime.create_named_selector(
        "increment",
        (|s: &u64| {
            std::thread::sleep(std::time::Duration::from_millis(20));
            *s
        },),
        |v: &u64| *v + 1,
    );

    assert_eq!(selector.select(&1), 2);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].duration < 5.0, "duration {}ms", events[0].duration);
    assert!(!notices
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::SlowComputation { .. })));
}

#[test]
fn test_explicit_name_wins_over_inferred() {
    let runtime = PerfRuntime::default();
    let selector = runtime.create_selector(
        (|s: &TodoState| s.todos.clone(), |s: &TodoState| s.filter.clone()),
        visible_todos,
        SelectorOptions::named("selectVisibleTodos"),
    );
    let state = TodoState {
        todos: Arc::new(Vec::new()),
        filter: Arc::new(String::new()),
    };
    assert!(selector.select(&state).is_empty());
    assert_eq!(selector.name(), "selectVisibleTodos");
}

#[test]
fn test_anonymous_names_are_unique() {
    let runtime = PerfRuntime::default();
    let first = runtime.create_selector((|s: &u8| *s,), |v: &u8| *v, SelectorOptions::default());
    let second = runtime.create_selector((|s: &u8| *s,), |v: &u8| *v, SelectorOptions::default());
    assert_eq!(first.select(&1), second.select(&1));

    assert!(first.name().starts_with("AnonymousSelector-"));
    assert!(second.name().starts_with("AnonymousSelector-"));
    assert_ne!(first.name(), second.name());
}

#[test]
fn test_selector_shared_across_threads() {
    let runtime = PerfRuntime::default();
    let selector = Arc::new(runtime.create_named_selector(
        "square",
        (|s: &u64| *s,),
        |v: &u64| v * v,
    ));

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let selector = selector.clone();
            std::thread::spawn(move || selector.select(&i))
        })
        .collect();
    let mut results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort_unstable();
    assert_eq!(results, vec![0, 1, 4, 9]);
}
