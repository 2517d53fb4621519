//! System uptime and idle time from `/proc/uptime`.

use std::path::PathBuf;

use tracing::debug;

use crate::collector::parser::parse_uptime;
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, Collector};
use crate::config::UptimeConfig;
use crate::metric::{MetricSink, Publisher};

/// Publishes `<path>.up` and `<path>.idle` in seconds.
pub struct UptimeCollector<F: FileSystem> {
    fs: F,
    config: UptimeConfig,
    precision: u32,
}

impl<F: FileSystem> UptimeCollector<F> {
    pub fn new(fs: F, config: UptimeConfig) -> Self {
        Self {
            fs,
            config,
            precision: 0,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    fn uptime_path(&self) -> PathBuf {
        PathBuf::from(&self.config.proc_path).join("uptime")
    }
}

impl<F: FileSystem> Collector for UptimeCollector<F> {
    fn name(&self) -> &'static str {
        "uptime"
    }

    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<usize, CollectError> {
        let path = self.uptime_path();
        let content = self.fs.read_to_string(&path)?;
        let uptime = parse_uptime(&content)?;
        debug!("{}: up={} idle={}", path.display(), uptime.uptime, uptime.idle);

        let mut publisher = Publisher::new(&self.config.path, self.precision, sink);
        publisher.publish_gauge("up", uptime.uptime);
        publisher.publish_gauge("idle", uptime.idle);
        Ok(publisher.published())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::metric::MemorySink;

    #[test]
    fn test_collect_synthetic_data() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/uptime", "600.0 300.0");

        let mut collector = UptimeCollector::new(fs, UptimeConfig::default());
        let mut sink = MemorySink::new();
        assert_eq!(collector.collect(&mut sink).unwrap(), 2);

        assert_eq!(sink.names(), vec!["uptime.up", "uptime.idle"]);
        assert_eq!(sink.value("uptime.up"), Some(600.0));
        assert_eq!(sink.value("uptime.idle"), Some(300.0));
    }

    #[test]
    fn test_collect_custom_proc_path() {
        let mut fs = MockFs::new();
        fs.add_file("/host/proc/uptime", "12345.67 40000.12\n");
        let config = UptimeConfig {
            path: "system.uptime".to_string(),
            proc_path: "/host/proc".to_string(),
        };

        let mut collector = UptimeCollector::new(fs, config).with_precision(2);
        let mut sink = MemorySink::new();
        collector.collect(&mut sink).unwrap();

        assert_eq!(sink.value("system.uptime.up"), Some(12345.67));
        assert_eq!(sink.metrics[0].precision, 2);
    }

    #[test]
    fn test_collect_missing_file() {
        let mut collector = UptimeCollector::new(MockFs::new(), UptimeConfig::default());
        let mut sink = MemorySink::new();
        let err = collector.collect(&mut sink).unwrap_err();
        assert!(matches!(err, CollectError::Io(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_collect_garbage() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/uptime", "");

        let mut collector = UptimeCollector::new(fs, UptimeConfig::default());
        let mut sink = MemorySink::new();
        let err = collector.collect(&mut sink).unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
    }
}
