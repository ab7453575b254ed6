//! Integration tests for the analytics aggregator
//!
//! Summary tables, tracking toggle, reset and end-to-end wiring with real
//! selectors and dispatches.

use statemeter::analytics::PerfAnalytics;
use statemeter::event::{ActionTiming, ComputationTiming, PerfEvent, StateSizeSample};
use statemeter::runtime::PerfRuntime;

fn computation(name: &str, duration: f64) -> PerfEvent {
    PerfEvent::ComputationTiming(ComputationTiming {
        name: name.to_string(),
        duration,
        recomputation: true,
        changed_index: None,
        timestamp: 0,
    })
}

fn action(name: &str, duration: f64) -> PerfEvent {
    PerfEvent::ActionTiming(ActionTiming {
        name: name.to_string(),
        duration,
        timestamp: 0,
    })
}

#[test]
fn test_heaviest_selector_totals() {
    let runtime = PerfRuntime::default();
    let analytics = runtime.analytics();
    for duration in [10.0, 30.0, 20.0] {
        runtime.channel().publish(computation("X", duration));
    }

    let summary = analytics.log_summary();
    let heaviest = &summary.computations.heaviest;
    assert_eq!(heaviest.len(), 1);
    assert_eq!(heaviest[0].name, "X");
    assert_eq!(heaviest[0].total, 60.0);
    assert_eq!(heaviest[0].max, 30.0);
    assert_eq!(heaviest[0].min, 10.0);
    assert_eq!(heaviest[0].avg, 20.0);
    assert_eq!(heaviest[0].count, 3);
}

#[test]
fn test_rankings_differ_by_criterion() {
    let runtime = PerfRuntime::default();
    let analytics = runtime.analytics();
    for _ in 0..5 {
        runtime.channel().publish(action("ui/hover", 0.1));
    }
    runtime.channel().publish(action("data/load", 40.0));
    runtime.channel().publish(action("list/sort", 8.0));
    runtime.channel().publish(action("list/sort", 8.0));
    runtime.channel().publish(action("list/sort", 8.0));
    runtime.channel().publish(action("list/sort", 8.0));
    runtime.channel().publish(action("list/sort", 8.0));
    runtime.channel().publish(action("list/sort", 8.0));

    let summary = analytics.summary();
    assert_eq!(summary.actions.most_frequent[0].name, "list/sort");
    assert_eq!(summary.actions.slowest[0].name, "data/load");
    assert_eq!(summary.actions.heaviest[0].name, "list/sort");
    assert!(summary.computations.is_empty());
}

#[test]
fn test_stop_tracking_ignores_events_and_start_resumes() {
    let runtime = PerfRuntime::default();
    let analytics = runtime.analytics();

    runtime.channel().publish(action("a", 1.0));
    analytics.stop_tracking();
    runtime.channel().publish(action("a", 100.0));
    runtime.channel().publish(action("b", 1.0));
    analytics.start_tracking();
    runtime.channel().publish(action("a", 2.0));

    let metric = analytics.action_metric("a").unwrap();
    assert_eq!(metric.count, 2);
    assert_eq!(metric.max_duration, 2.0);
    assert!(analytics.action_metric("b").is_none());
}

#[test]
fn test_reset_clears_tables_and_keeps_tracking_flag() {
    let runtime = PerfRuntime::default();
    let analytics = runtime.analytics();
    runtime.channel().publish(action("a", 1.0));
    runtime.channel().publish(computation("sel", 1.0));
    runtime.channel().publish(PerfEvent::StateSize(StateSizeSample {
        size: 10,
        timestamp: 0,
    }));

    analytics.reset();
    let summary = analytics.log_summary();
    assert!(summary.is_empty());
    assert!(analytics.state_size_history().is_empty());
    assert!(analytics.is_tracking());

    analytics.stop_tracking();
    analytics.reset();
    assert!(!analytics.is_tracking());
}

#[test]
fn test_end_to_end_with_selector_and_dispatch() {
    let runtime = PerfRuntime::default();
    let analytics = PerfAnalytics::with_top_n(runtime.clone(), 5);
    let timer = runtime.dispatch_timer();
    let total = runtime.create_named_selector(
        "selectTotal",
        (|s: &Vec<u32>| s.len(),),
        |n: &usize| n * 2,
    );

    let mut state: Vec<u32> = Vec::new();
    for value in 0..3 {
        let snapshot = state.clone();
        timer.intercept(&move || snapshot.clone(), "items/push", |_| state.push(value));
        total.select(&state);
        total.select(&state);
    }

    let summary = analytics.summary();
    assert_eq!(summary.top_n, 5);
    assert_eq!(analytics.action_metric("items/push").unwrap().count, 3);
    assert_eq!(analytics.computation_metric("selectTotal").unwrap().count, 3);
    assert!(summary.latest_state_size.is_some());

    let rendered = summary.to_string();
    assert!(rendered.contains("--- Top 5 Most Triggered Actions ---"));
    assert!(rendered.contains("items/push"));
    assert!(rendered.contains("selectTotal"));
}

#[test]
fn test_multiple_aggregators_share_a_channel() {
    let runtime = PerfRuntime::default();
    let first = runtime.analytics();
    let second = runtime.analytics();

    runtime.channel().publish(action("a", 3.0));
    second.stop_tracking();
    runtime.channel().publish(action("a", 3.0));

    assert_eq!(first.action_metric("a").unwrap().count, 2);
    assert_eq!(second.action_metric("a").unwrap().count, 1);
}
