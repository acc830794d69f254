//! Metrics seam
//!
//! The bridge reports call timings and error counts through
//! [`MetricsCollector`]. Exporters live outside this crate; the default
//! [`InMemoryMetrics`] just aggregates in process.

use dashmap::DashMap;
use std::collections::HashMap;

/// Metric tags
pub type Tags = HashMap<String, String>;

/// Sink for bridge metrics
pub trait MetricsCollector: Send + Sync {
    /// Record one observation of `metric` under `namespace`
    fn collect(&self, namespace: &str, metric: &str, value: f64, tags: &Tags);

    fn inc_counter(&self, metric: &str, tags: &Tags);
}

/// Aggregate of observations for one series
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

impl Summary {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// In-process collector
///
/// Series are keyed `metric:tag=value,...` with tags sorted; observations
/// additionally prefix the namespace (`namespace.metric`).
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    summaries: DashMap<String, Summary>,
    counters: DashMap<String, u64>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, key: &str) -> Option<Summary> {
        self.summaries.get(key).map(|s| *s)
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Sum of a counter across every tag combination
    pub fn counter_total(&self, metric: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| series_name(entry.key()) == metric)
            .map(|entry| *entry.value())
            .sum()
    }

    /// Observation count of a metric across every tag combination
    pub fn observation_count(&self, metric: &str) -> u64 {
        self.summaries
            .iter()
            .filter(|entry| series_name(entry.key()) == metric)
            .map(|entry| entry.value().count)
            .sum()
    }

    pub fn series(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .summaries
            .iter()
            .map(|e| e.key().clone())
            .chain(self.counters.iter().map(|e| e.key().clone()))
            .collect();
        keys.sort();
        keys
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn collect(&self, namespace: &str, metric: &str, value: f64, tags: &Tags) {
        let name = if namespace.is_empty() {
            metric.to_string()
        } else {
            format!("{}.{}", namespace, metric)
        };
        self.summaries
            .entry(series_key(&name, tags))
            .or_default()
            .observe(value);
    }

    fn inc_counter(&self, metric: &str, tags: &Tags) {
        *self.counters.entry(series_key(metric, tags)).or_insert(0) += 1;
    }
}

fn series_key(name: &str, tags: &Tags) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut parts: Vec<_> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.sort();
    format!("{}:{}", name, parts.join(","))
}

fn series_name(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}
