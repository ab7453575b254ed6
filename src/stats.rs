//! Running per-name timing statistics
//!
//! Each [`MetricTable`] maps a name (action type or selector name) to a
//! [`RunningMetric`] holding exact count / total / min / max. Names keep the
//! order of their first appearance, which is also the tie-break order of the
//! ranked views.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact running aggregate for one name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningMetric {
    /// Number of samples
    pub count: u64,
    /// Sum of sample durations (ms)
    pub total_duration: f64,
    /// Largest sample (ms), 0 before the first sample
    pub max_duration: f64,
    /// Smallest sample (ms), +∞ before the first sample
    pub min_duration: f64,
}

impl Default for RunningMetric {
    fn default() -> Self {
        Self {
            count: 0,
            total_duration: 0.0,
            max_duration: 0.0,
            min_duration: f64::INFINITY,
        }
    }
}

impl RunningMetric {
    /// Fold one sample into the aggregate
    pub fn record(&mut self, duration_ms: f64) {
        self.count += 1;
        self.total_duration += duration_ms;
        self.max_duration = self.max_duration.max(duration_ms);
        self.min_duration = self.min_duration.min(duration_ms);
    }

    /// Mean duration, 0 when empty
    pub fn average_duration(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_duration / self.count as f64
        }
    }
}

/// Ranking criterion for [`MetricTable::ranked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    /// Most frequent first
    Count,
    /// Slowest single sample first
    MaxDuration,
    /// Largest cumulative time first
    TotalDuration,
}

/// One row of a ranked table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    pub count: u64,
    /// Average duration (ms)
    pub avg: f64,
    /// Minimum duration (ms)
    pub min: f64,
    /// Maximum duration (ms)
    pub max: f64,
    /// Total duration (ms)
    pub total: f64,
}

impl MetricEntry {
    fn from_metric(name: &str, metric: &RunningMetric) -> Self {
        Self {
            name: name.to_string(),
            count: metric.count,
            avg: metric.average_duration(),
            min: metric.min_duration,
            max: metric.max_duration,
            total: metric.total_duration,
        }
    }
}

/// Insertion-ordered map of running metrics
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    metrics: IndexMap<String, RunningMetric>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, creating the metric on first sight of `name`
    pub fn record(&mut self, name: &str, duration_ms: f64) {
        match self.metrics.get_mut(name) {
            Some(metric) => metric.record(duration_ms),
            None => {
                let mut metric = RunningMetric::default();
                metric.record(duration_ms);
                self.metrics.insert(name.to_string(), metric);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RunningMetric> {
        self.metrics.get(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
    }

    /// Names in first-appearance order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Top `limit` entries, descending by `order`; ties keep first-appearance order
    pub fn ranked(&self, order: RankBy, limit: usize) -> Vec<MetricEntry> {
        let mut entries: Vec<(&String, &RunningMetric)> = self.metrics.iter().collect();
        // sort_by is stable, which preserves insertion order among equals
        entries.sort_by(|(_, a), (_, b)| match order {
            RankBy::Count => b.count.cmp(&a.count),
            RankBy::MaxDuration => b.max_duration.total_cmp(&a.max_duration),
            RankBy::TotalDuration => b.total_duration.total_cmp(&a.total_duration),
        });
        entries
            .into_iter()
            .take(limit)
            .map(|(name, metric)| MetricEntry::from_metric(name, metric))
            .collect()
    }
}

/// Render entries as an aligned text table
pub struct EntryTable<'a>(pub &'a [MetricEntry]);

impl fmt::Display for EntryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "  (no data)");
        }

        let width = self
            .0
            .iter()
            .map(|e| e.name.len())
            .max()
            .unwrap_or(0)
            .max("Name".len());

        writeln!(
            f,
            "{:<width$} {:>10} {:>12} {:>12} {:>14}",
            "Name",
            "Count",
            "Avg",
            "Max",
            "Total",
            width = width
        )?;
        writeln!(f, "{}", "─".repeat(width + 52))?;
        for entry in self.0 {
            writeln!(
                f,
                "{:<width$} {:>10} {:>10.2}ms {:>10.2}ms {:>12.2}ms",
                entry.name,
                entry.count,
                entry.avg,
                entry.max,
                entry.total,
                width = width
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_metric_default() {
        let metric = RunningMetric::default();
        assert_eq!(metric.count, 0);
        assert_eq!(metric.total_duration, 0.0);
        assert_eq!(metric.max_duration, 0.0);
        assert!(metric.min_duration.is_infinite());
        assert_eq!(metric.average_duration(), 0.0);
    }

    #[test]
    fn test_running_metric_record() {
        let mut metric = RunningMetric::default();
        metric.record(10.0);
        metric.record(30.0);
        metric.record(20.0);

        assert_eq!(metric.count, 3);
        assert_eq!(metric.total_duration, 60.0);
        assert_eq!(metric.max_duration, 30.0);
        assert_eq!(metric.min_duration, 10.0);
        assert_eq!(metric.average_duration(), 20.0);
    }

    #[test]
    fn test_table_record_and_lookup() {
        let mut table = MetricTable::new();
        table.record("main", 1.0);
        table.record("main", 2.0);
        table.record("helper", 0.5);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("main").unwrap().count, 2);
        assert_eq!(table.get("main").unwrap().total_duration, 3.0);
        assert_eq!(table.get("helper").unwrap().count, 1);
        assert!(table.get("missing").is_none());
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["main", "helper"]);
    }

    #[test]
    fn test_ranked_orders() {
        let mut table = MetricTable::new();
        table.record("frequent", 1.0);
        table.record("frequent", 1.0);
        table.record("frequent", 1.0);
        table.record("spiky", 50.0);
        table.record("steady", 20.0);
        table.record("steady", 20.0);
        table.record("steady", 20.0);

        let by_count = table.ranked(RankBy::Count, 10);
        assert_eq!(by_count[0].name, "frequent");
        assert_eq!(by_count[1].name, "steady");

        let by_max = table.ranked(RankBy::MaxDuration, 10);
        assert_eq!(by_max[0].name, "spiky");

        let by_total = table.ranked(RankBy::TotalDuration, 10);
        assert_eq!(by_total[0].name, "steady");
        assert_eq!(by_total[0].total, 60.0);
    }

    #[test]
    fn test_ranked_ties_keep_first_appearance() {
        let mut table = MetricTable::new();
        for name in ["c", "a", "b"] {
            table.record(name, 5.0);
        }
        let names: Vec<_> = table
            .ranked(RankBy::Count, 10)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_ranked_limit() {
        let mut table = MetricTable::new();
        for i in 0..15 {
            table.record(&format!("name_{}", i), i as f64);
        }
        let top = table.ranked(RankBy::MaxDuration, 10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].name, "name_14");
        assert_eq!(top[9].name, "name_5");
    }

    #[test]
    fn test_clear() {
        let mut table = MetricTable::new();
        table.record("x", 1.0);
        table.clear();
        assert!(table.is_empty());
        assert!(table.ranked(RankBy::Count, 10).is_empty());
    }

    #[test]
    fn test_entry_table_render() {
        let entries = vec![MetricEntry {
            name: "selectVisible".to_string(),
            count: 3,
            avg: 20.0,
            min: 10.0,
            max: 30.0,
            total: 60.0,
        }];
        let rendered = EntryTable(&entries).to_string();
        assert!(rendered.contains("selectVisible"));
        assert!(rendered.contains("60.00ms"));
        assert!(EntryTable(&[]).to_string().contains("(no data)"));
    }
}
