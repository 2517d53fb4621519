//! Collectors that poll statistics sources and publish flat metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Collector                            │
//! │  ┌────────────────┐ ┌──────────────────┐ ┌────────────────┐  │
//! │  │ CephCollector  │ │ CephPoolStats    │ │ UptimeCollector│  │
//! │  │ perf dump/     │ │ osd pool stats   │ │ /proc/uptime   │  │
//! │  │ perf schema    │ │                  │ │                │  │
//! │  └───────┬────────┘ └────────┬─────────┘ └───────┬────────┘  │
//! │          │   JSON → NestedValue → flatten        │           │
//! │          └───────────────┬───────────────────────┘           │
//! │                   ┌──────▼──────┐                            │
//! │                   │  Publisher  │ → MetricSink               │
//! │                   └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//!        │                                        │
//!  ┌─────▼─────────┐                        ┌─────▼─────┐
//!  │ CommandRunner │ (RealRunner/MockRunner)│ FileSystem│ (RealFs/MockFs)
//!  └───────────────┘                        └───────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use statflat_core::collector::{Collector, MockFs, UptimeCollector};
//! use statflat_core::config::UptimeConfig;
//! use statflat_core::metric::MemorySink;
//!
//! let mut fs = MockFs::new();
//! fs.add_file("/proc/uptime", "600.0 300.0\n");
//!
//! let mut collector = UptimeCollector::new(fs, UptimeConfig::default());
//! let mut sink = MemorySink::new();
//! collector.collect(&mut sink).unwrap();
//! assert_eq!(sink.value("uptime.up"), Some(600.0));
//! ```

pub mod ceph;
pub mod cephpoolstats;
pub mod mock;
pub mod parser;
pub mod traits;
pub mod uptime;

use serde_json::Value;
use tracing::debug;

use crate::counters::CounterTracker;
use crate::metric::MetricSink;

pub use ceph::CephCollector;
pub use cephpoolstats::CephPoolStatsCollector;
pub use mock::{MockFs, MockRunner};
pub use parser::ParseError;
pub use traits::{CommandOutput, CommandRunner, FileSystem, RealFs, RealRunner};
pub use uptime::UptimeCollector;

/// Error type for a collection cycle.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a statistics source.
    Io(std::io::Error),
    /// External command could not be started or exited non-zero.
    Command { command: String, message: String },
    /// Command output is not valid JSON.
    Json(serde_json::Error),
    /// Parse error in a text statistics source.
    Parse(ParseError),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Command { command, message } => {
                write!(f, "command `{}` failed: {}", command, message)
            }
            CollectError::Json(e) => write!(f, "invalid JSON: {}", e),
            CollectError::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(e: serde_json::Error) -> Self {
        CollectError::Json(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e)
    }
}

/// A statistics source polled once per collection cycle.
pub trait Collector {
    /// Short name used in logs and on the command line.
    fn name(&self) -> &'static str;

    /// Runs one collection cycle, publishing into `sink`.
    ///
    /// Returns the number of metrics published. Partial failures (one
    /// socket, one pool) are logged and skipped; an `Err` means the cycle
    /// produced no data at all.
    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<usize, CollectError>;

    /// Counter samples to keep for the next run, for collectors publishing
    /// counter deltas.
    fn counters(&self) -> Option<&CounterTracker> {
        None
    }
}

/// Runs `program args...` and parses its stdout as JSON.
pub(crate) fn run_json<R: CommandRunner>(
    runner: &R,
    program: &str,
    args: &[String],
) -> Result<Value, CollectError> {
    let command = format!("{} {}", program, args.join(" "));
    debug!("Running {}", command);

    let output = runner
        .run(program, args)
        .map_err(|e| CollectError::Command {
            command: command.clone(),
            message: e.to_string(),
        })?;

    if !output.success {
        let status = output
            .code
            .map(|c| format!("exit status {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        };
        return Err(CollectError::Command { command, message });
    }

    Ok(serde_json::from_str(&output.stdout)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_json_parses_stdout() {
        let mut runner = MockRunner::new();
        runner.respond(&["ceph", "perf", "dump"], r#"{"a": 1}"#);

        let value = run_json(&runner, "ceph", &args(&["perf", "dump"])).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_run_json_command_failure() {
        let mut runner = MockRunner::new();
        runner.fail(&["ceph", "perf", "dump"], 255, "error!\n");

        let err = run_json(&runner, "ceph", &args(&["perf", "dump"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "command `ceph perf dump` failed: exit status 255: error!"
        );
    }

    #[test]
    fn test_run_json_spawn_failure() {
        let runner = MockRunner::new();
        let err = run_json(&runner, "ceph", &args(&["perf", "dump"])).unwrap_err();
        assert!(matches!(err, CollectError::Command { .. }));
    }

    #[test]
    fn test_run_json_invalid_output() {
        let mut runner = MockRunner::new();
        runner.respond(&["ceph", "perf", "dump"], "not json");

        let err = run_json(&runner, "ceph", &args(&["perf", "dump"])).unwrap_err();
        assert!(matches!(err, CollectError::Json(_)));
    }
}
