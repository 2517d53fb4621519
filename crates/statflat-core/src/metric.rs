//! Metric publishing: flat `(name, value)` pairs handed to a sink.
//!
//! Collectors never talk to a sink directly. They go through a [`Publisher`],
//! which owns the collector's path prefix, the output precision and the
//! collection timestamp, and which performs the numeric coercion of
//! flattened leaves.

use std::io::Write;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

use crate::counters::CounterTracker;
use crate::flatten::FlattenResult;

/// How a metric value should be interpreted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value.
    Gauge,
    /// Monotonic counter: the running total, or its change since the
    /// previous sample in delta mode.
    Counter,
}

/// A single published data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    /// Number of decimal places used when the value is rendered.
    pub precision: u32,
    pub kind: MetricKind,
    /// Collection time, seconds since epoch.
    pub timestamp: i64,
}

/// Destination for published metrics.
pub trait MetricSink {
    fn publish(&mut self, metric: Metric);
}

/// Sink that keeps every metric in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub metrics: Vec<Metric>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the last metric published under `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }

    /// Names of all published metrics, in publish order.
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl MetricSink for MemorySink {
    fn publish(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }
}

/// Sink writing Graphite plaintext lines: `name value timestamp`.
pub struct LineSink<W: Write> {
    writer: W,
    write_errors: u64,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            write_errors: 0,
        }
    }

    /// Number of lines that could not be written.
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Renders a metric as one plaintext line (without the trailing newline).
pub fn format_line(metric: &Metric) -> String {
    format!(
        "{} {:.prec$} {}",
        metric.name,
        metric.value,
        metric.timestamp,
        prec = metric.precision as usize
    )
}

impl<W: Write> MetricSink for LineSink<W> {
    fn publish(&mut self, metric: Metric) {
        if let Err(e) = writeln!(self.writer, "{}", format_line(&metric)) {
            // Log once per sink.
            if self.write_errors == 0 {
                error!("Failed to write metric {}: {}", metric.name, e);
            }
            self.write_errors += 1;
        }
    }
}

/// Publishes metrics for one collector during one collection cycle.
pub struct Publisher<'a> {
    path: &'a str,
    precision: u32,
    timestamp: i64,
    sink: &'a mut dyn MetricSink,
    published: usize,
}

impl<'a> Publisher<'a> {
    /// Creates a publisher prefixing every name with `path` (may be empty).
    pub fn new(path: &'a str, precision: u32, sink: &'a mut dyn MetricSink) -> Self {
        Self {
            path,
            precision,
            timestamp: Utc::now().timestamp(),
            sink,
            published: 0,
        }
    }

    /// Overrides the collection timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Number of metrics published so far.
    pub fn published(&self) -> usize {
        self.published
    }

    /// Fully qualified name of `name` under this publisher's path.
    pub fn qualified_name(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }

    pub fn publish_gauge(&mut self, name: &str, value: f64) {
        self.publish(name, value, MetricKind::Gauge);
    }

    /// Publishes the running total of a monotonic counter.
    pub fn publish_raw_counter(&mut self, name: &str, value: f64) {
        self.publish(name, value, MetricKind::Counter);
    }

    /// Publishes the delta of a monotonic counter since the previous cycle.
    ///
    /// Returns `false` when no delta is available yet (first sample or reset).
    pub fn publish_counter(
        &mut self,
        name: &str,
        value: f64,
        counters: &mut CounterTracker,
    ) -> bool {
        let qualified = self.qualified_name(name);
        match counters.delta(&qualified, value) {
            Some(delta) => {
                self.emit(qualified, delta, MetricKind::Counter);
                true
            }
            None => false,
        }
    }

    /// Publishes every leaf of a flattened payload as a gauge.
    ///
    /// Paths are joined with `.`. Leaves that are not numeric are skipped.
    pub fn publish_flat(&mut self, result: &FlattenResult) -> usize {
        let before = self.published;
        for (path, value) in result {
            let name = path.join(".");
            match value.as_f64() {
                Some(v) => self.publish_gauge(&name, v),
                None => warn!("Skipping non-numeric metric {}: {:?}", name, value.to_string()),
            }
        }
        self.published - before
    }

    fn publish(&mut self, name: &str, value: f64, kind: MetricKind) {
        let qualified = self.qualified_name(name);
        self.emit(qualified, value, kind);
    }

    fn emit(&mut self, name: String, value: f64, kind: MetricKind) {
        self.sink.publish(Metric {
            name,
            value,
            precision: self.precision,
            kind,
            timestamp: self.timestamp,
        });
        self.published += 1;
    }
}
