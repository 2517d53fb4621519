//! Delta computation for monotonic counters.
//!
//! Admin sockets report counters as running totals since daemon start. The
//! tracker remembers the previous raw value per metric name and turns each new
//! sample into a per-cycle delta. Between runs of a one-shot process the
//! samples can be kept in a small JSON state file.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;

/// Computes f64 delta, returning `None` on counter regression (daemon restart
/// or stats reset).
pub fn df64(curr: f64, prev: f64) -> Option<f64> {
    (curr >= prev).then_some(curr - prev)
}

/// Previous counter samples, keyed by fully qualified metric name.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterTracker {
    prev_sample: HashMap<String, f64>,
}

impl CounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads samples saved by [`CounterTracker::save`]. A missing file gives
    /// an empty tracker.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No counter state at {}", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes all samples to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Previous sample of `name`, if any.
    pub fn previous(&self, name: &str) -> Option<f64> {
        self.prev_sample.get(name).copied()
    }

    /// Records `value` for `name` and returns the delta since the last sample.
    ///
    /// The first sample of a name is a baseline and yields `None`. A regression
    /// also yields `None` and re-baselines at the new value.
    pub fn delta(&mut self, name: &str, value: f64) -> Option<f64> {
        match self.prev_sample.get_mut(name) {
            Some(prev) => {
                let delta = df64(value, *prev);
                *prev = value;
                delta
            }
            None => {
                self.prev_sample.insert(name.to_string(), value);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.prev_sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev_sample.is_empty()
    }

    pub fn reset(&mut self) {
        self.prev_sample.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_baseline() {
        let mut tracker = CounterTracker::new();
        assert_eq!(tracker.delta("osd.op_r", 100.0), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_delta_on_second_sample() {
        let mut tracker = CounterTracker::new();
        tracker.delta("osd.op_r", 100.0);
        assert_eq!(tracker.delta("osd.op_r", 150.0), Some(50.0));
        assert_eq!(tracker.delta("osd.op_r", 150.0), Some(0.0));
    }

    #[test]
    fn test_regression_rebaselines() {
        let mut tracker = CounterTracker::new();
        tracker.delta("osd.op_r", 100.0);
        assert_eq!(tracker.delta("osd.op_r", 10.0), None);
        assert_eq!(tracker.delta("osd.op_r", 25.0), Some(15.0));
    }

    #[test]
    fn test_names_are_independent() {
        let mut tracker = CounterTracker::new();
        tracker.delta("a", 1.0);
        tracker.delta("b", 10.0);
        assert_eq!(tracker.delta("a", 2.0), Some(1.0));
        assert_eq!(tracker.delta("b", 30.0), Some(20.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let mut tracker = CounterTracker::new();
        tracker.delta("ceph.osd.op_r", 100.0);
        tracker.save(&path).unwrap();

        let mut restored = CounterTracker::load(&path).unwrap();
        assert_eq!(restored.previous("ceph.osd.op_r"), Some(100.0));
        assert_eq!(restored.delta("ceph.osd.op_r", 140.0), Some(40.0));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = CounterTracker::load(&dir.path().join("missing.json")).unwrap();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(CounterTracker::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tracker = CounterTracker::new();
        tracker.delta("a", 1.0);
        tracker.reset();
        assert!(tracker.is_empty());
        assert_eq!(tracker.delta("a", 5.0), None);
    }
}
