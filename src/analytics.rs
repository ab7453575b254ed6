//! Streaming analytics over the metric topics
//!
//! [`PerfAnalytics`] subscribes to all three topics at construction and folds
//! every event into running per-name statistics. A summary can be requested
//! at any time; it ranks actions and selectors by count, by slowest single
//! sample and by cumulative time.
//!
//! Tracking can be paused with [`PerfAnalytics::stop_tracking`]. Events
//! published while stopped are not observed and are never replayed.

use crate::config::SharedConfig;
use crate::event::{PerfEvent, StateSizeSample, Topic};
use crate::event_channel::Subscription;
use crate::notify::{Notice, Notifier};
use crate::runtime::PerfRuntime;
use crate::stats::{EntryTable, MetricEntry, MetricTable, RankBy, RunningMetric};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of rows per ranked table
pub const DEFAULT_TOP_N: usize = 10;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default)]
struct Tables {
    actions: MetricTable,
    computations: MetricTable,
    state_sizes: Vec<StateSizeSample>,
}

impl Tables {
    fn clear(&mut self) {
        self.actions.clear();
        self.computations.clear();
        self.state_sizes.clear();
    }
}

/// Aggregator of action and selector timings plus state-size history
#[derive(Debug)]
pub struct PerfAnalytics {
    runtime: PerfRuntime,
    tables: Arc<Mutex<Tables>>,
    // Non-empty exactly while tracking.
    subscriptions: Mutex<Vec<Subscription>>,
    top_n: usize,
}

impl PerfAnalytics {
    /// Create an aggregator; tracking starts immediately
    pub fn new(runtime: PerfRuntime) -> Self {
        Self::with_top_n(runtime, DEFAULT_TOP_N)
    }

    /// Create an aggregator whose ranked tables hold `top_n` rows
    pub fn with_top_n(runtime: PerfRuntime, top_n: usize) -> Self {
        let analytics = Self {
            runtime,
            tables: Arc::new(Mutex::new(Tables::default())),
            subscriptions: Mutex::new(Vec::new()),
            top_n,
        };
        analytics.start_tracking();
        analytics
    }

    /// Subscribe to all metric topics; no-op if already tracking
    pub fn start_tracking(&self) {
        let mut subscriptions = self.lock_subscriptions();
        if !subscriptions.is_empty() {
            return;
        }

        let channel = self.runtime.channel();

        let tables = self.tables.clone();
        subscriptions.push(channel.subscribe(Topic::ActionTiming, move |event| {
            if let PerfEvent::ActionTiming(timing) = event {
                lock(&tables).actions.record(&timing.name, timing.duration);
            }
        }));

        let tables = self.tables.clone();
        subscriptions.push(channel.subscribe(Topic::ComputationTiming, move |event| {
            if let PerfEvent::ComputationTiming(timing) = event {
                lock(&tables)
                    .computations
                    .record(&timing.name, timing.duration);
            }
        }));

        let tables = self.tables.clone();
        let config = self.runtime.config().clone();
        let notifier = self.runtime.notifier();
        subscriptions.push(channel.subscribe(Topic::StateSize, move |event| {
            if let PerfEvent::StateSize(sample) = event {
                lock(&tables).state_sizes.push(*sample);
                check_state_size(&config, notifier.as_ref(), sample);
            }
        }));

        tracing::debug!("perf analytics tracking started");
    }

    /// Unsubscribe from all topics; no-op if already stopped
    pub fn stop_tracking(&self) {
        let subscriptions: Vec<Subscription> = std::mem::take(&mut *self.lock_subscriptions());
        if subscriptions.is_empty() {
            return;
        }
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        tracing::debug!("perf analytics tracking stopped");
    }

    pub fn is_tracking(&self) -> bool {
        !self.lock_subscriptions().is_empty()
    }

    /// Clear statistics and size history; tracking state is untouched
    pub fn reset(&self) {
        lock(&self.tables).clear();
        tracing::info!(target: "statemeter", "Performance metrics reset");
    }

    /// Running statistics for one action type
    pub fn action_metric(&self, name: &str) -> Option<RunningMetric> {
        lock(&self.tables).actions.get(name).copied()
    }

    /// Running statistics for one selector
    pub fn computation_metric(&self, name: &str) -> Option<RunningMetric> {
        lock(&self.tables).computations.get(name).copied()
    }

    /// Every state-size sample observed since the last reset, oldest first
    pub fn state_size_history(&self) -> Vec<StateSizeSample> {
        lock(&self.tables).state_sizes.clone()
    }

    /// Ranked snapshot of everything observed so far
    pub fn summary(&self) -> PerfSummary {
        let tables = lock(&self.tables);
        PerfSummary {
            top_n: self.top_n,
            actions: CategorySummary::from_table(&tables.actions, self.top_n),
            computations: CategorySummary::from_table(&tables.computations, self.top_n),
            latest_state_size: tables.state_sizes.last().copied(),
        }
    }

    /// Print the summary tables to stderr and return them
    pub fn log_summary(&self) -> PerfSummary {
        let summary = self.summary();
        eprintln!("{}", summary);
        summary
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

// Every qualifying sample is checked; throttling already happened upstream.
fn check_state_size(config: &SharedConfig, notifier: &dyn Notifier, sample: &StateSizeSample) {
    let config = config.snapshot();
    if sample.size as f64 > config.max_store_size_bytes() {
        notifier.notify(&Notice::HighMemory {
            size_bytes: sample.size,
            threshold_mb: config.max_store_size_threshold_mb,
        });
    }
}

/// Three ranked views over one metric namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    /// Highest count first
    pub most_frequent: Vec<MetricEntry>,
    /// Highest max duration first
    pub slowest: Vec<MetricEntry>,
    /// Highest total duration first
    pub heaviest: Vec<MetricEntry>,
}

impl CategorySummary {
    fn from_table(table: &MetricTable, limit: usize) -> Self {
        Self {
            most_frequent: table.ranked(RankBy::Count, limit),
            slowest: table.ranked(RankBy::MaxDuration, limit),
            heaviest: table.ranked(RankBy::TotalDuration, limit),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.most_frequent.is_empty() && self.slowest.is_empty() && self.heaviest.is_empty()
    }
}

/// Point-in-time summary produced by [`PerfAnalytics::summary`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSummary {
    /// Rows per ranked table
    pub top_n: usize,
    pub actions: CategorySummary,
    pub computations: CategorySummary,
    /// Most recent state-size sample, if any
    pub latest_state_size: Option<StateSizeSample>,
}

impl PerfSummary {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.computations.is_empty() && self.latest_state_size.is_none()
    }
}

impl fmt::Display for PerfSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[statemeter] Performance Summary")?;

        let sections = [
            ("Most Triggered Actions", &self.actions.most_frequent),
            ("Slowest Actions (Max Duration)", &self.actions.slowest),
            ("Heaviest Actions (Total Time)", &self.actions.heaviest),
            ("Most Triggered Selectors", &self.computations.most_frequent),
            ("Slowest Selectors (Max Duration)", &self.computations.slowest),
            ("Heaviest Selectors (Total Time)", &self.computations.heaviest),
        ];
        for (title, entries) in sections {
            writeln!(f)?;
            writeln!(f, "--- Top {} {} ---", self.top_n, title)?;
            write!(f, "{}", EntryTable(entries))?;
        }

        if let Some(sample) = self.latest_state_size {
            writeln!(f)?;
            writeln!(
                f,
                "Current Store Size: {:.2}MB",
                sample.size as f64 / BYTES_PER_MB
            )?;
        }
        Ok(())
    }
}
