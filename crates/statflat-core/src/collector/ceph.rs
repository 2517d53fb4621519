//! Ceph daemon perf counters read through admin sockets.
//!
//! Every daemon on the host exposes an admin socket
//! (`/var/run/ceph/<cluster>-<type>.<id>.asok`). For each socket the collector
//! runs
//!
//! ```text
//! ceph --admin-daemon <socket> perf dump
//! ceph --admin-daemon <socket> perf schema
//! ```
//!
//! flattens the dump under `<cluster>.<type>.<id>` and publishes each leaf.
//! The schema tells which counters are monotonic. Those are published as
//! counters (running totals, or per-cycle deltas in delta mode), everything
//! else as gauges.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::parser::parse_socket_name;
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::{CollectError, Collector, run_json};
use crate::config::{CephConfig, CounterMode};
use crate::counters::CounterTracker;
use crate::flatten::{self, NestedValue, Path as MetricPath, Scalar};
use crate::metric::{MetricSink, Publisher};

/// Schema type bit: value is a long-running average (`avgcount` + `sum`).
pub const PERFCOUNTER_LONGRUNAVG: u64 = 0x4;
/// Schema type bit: value only ever increases.
pub const PERFCOUNTER_COUNTER: u64 = 0x8;

/// Counter type bits keyed by dotted counter path (`osd.op_r`).
pub type CounterTypes = BTreeMap<String, u64>;

/// Extracts counter type bits from a `perf schema` payload.
///
/// A descriptor is any branch holding a numeric `type` leaf; its path is the
/// counter path. Descriptors are not searched for nested descriptors.
pub fn counter_types(schema: &NestedValue) -> CounterTypes {
    let mut types = CounterTypes::new();
    collect_counter_types(schema, &MetricPath::new(), &mut types);
    types
}

fn collect_counter_types(node: &NestedValue, path: &MetricPath, types: &mut CounterTypes) {
    let NestedValue::Branch(children) = node else {
        return;
    };

    let type_bits = children
        .get("type")
        .and_then(NestedValue::as_scalar)
        .and_then(Scalar::as_f64);
    if let Some(bits) = type_bits
        && !path.is_empty()
    {
        types.insert(path.join("."), bits as u64);
        return;
    }

    for (key, child) in children {
        collect_counter_types(child, &path.child(key.as_str()), types);
    }
}

/// Finds the type of the counter owning `segments`.
///
/// Long-running averages are flattened into `<counter>.avgcount` and
/// `<counter>.sum`, so the longest described prefix wins.
pub fn lookup_counter_type(types: &CounterTypes, segments: &[String]) -> Option<u64> {
    (1..=segments.len())
        .rev()
        .find_map(|n| types.get(&segments[..n].join(".")).copied())
}

/// Returns whether a counter with `bits` is monotonic.
pub fn is_counter(bits: u64) -> bool {
    bits & (PERFCOUNTER_COUNTER | PERFCOUNTER_LONGRUNAVG) != 0
}

/// Collects perf counters from every admin socket in `socket_path`.
pub struct CephCollector<F: FileSystem, R: CommandRunner> {
    fs: F,
    runner: R,
    config: CephConfig,
    precision: u32,
    counter_mode: CounterMode,
    counters: CounterTracker,
}

impl<F: FileSystem, R: CommandRunner> CephCollector<F, R> {
    pub fn new(fs: F, runner: R, config: CephConfig) -> Self {
        Self {
            fs,
            runner,
            config,
            precision: 0,
            counter_mode: CounterMode::default(),
            counters: CounterTracker::new(),
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_counter_mode(mut self, mode: CounterMode) -> Self {
        self.counter_mode = mode;
        self
    }

    /// Seeds delta computation with samples from a previous run.
    pub fn with_counters(mut self, counters: CounterTracker) -> Self {
        self.counters = counters;
        self
    }

    /// Lists admin sockets: entries of `socket_path` ending in `.<socket_ext>`,
    /// sorted by path. A missing directory means no daemons on this host.
    pub fn socket_paths(&self) -> Result<Vec<PathBuf>, CollectError> {
        let dir = Path::new(&self.config.socket_path);
        let entries = match self.fs.read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Socket directory {} not found", dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let ext = self.config.socket_ext.as_str();
        let mut sockets: Vec<PathBuf> = entries
            .into_iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
            .collect();
        sockets.sort();
        Ok(sockets)
    }

    /// Runs `perf dump` and `perf schema` against one socket.
    ///
    /// Malformed subtrees in either payload are logged and dropped.
    pub fn get_perf_counters(
        &self,
        socket: &Path,
    ) -> Result<(NestedValue, NestedValue), CollectError> {
        let stats = self.admin_command(socket, "dump")?;
        let schema = self.admin_command(socket, "schema")?;
        Ok((stats, schema))
    }

    fn admin_command(&self, socket: &Path, command: &str) -> Result<NestedValue, CollectError> {
        let args = vec![
            "--admin-daemon".to_string(),
            socket.to_string_lossy().into_owned(),
            "perf".to_string(),
            command.to_string(),
        ];
        let json = run_json(&self.runner, &self.config.ceph_binary, &args)?;

        let (value, errors) = NestedValue::from_json_lossy(&json);
        for e in errors {
            warn!("{} perf {}: {}", socket.display(), command, e);
        }
        Ok(value)
    }
}

impl<F: FileSystem, R: CommandRunner> Collector for CephCollector<F, R> {
    fn name(&self) -> &'static str {
        "ceph"
    }

    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<usize, CollectError> {
        let sockets = self.socket_paths()?;
        debug!("Found {} admin sockets", sockets.len());

        let mut daemons = Vec::with_capacity(sockets.len());
        for socket in &sockets {
            let Some(name) = parse_socket_name(socket) else {
                warn!("Skipping unrecognized socket name {}", socket.display());
                continue;
            };
            match self.get_perf_counters(socket) {
                Ok((stats, schema)) => daemons.push((name, stats, counter_types(&schema))),
                Err(e) => warn!("Could not get perf counters from {}: {}", socket.display(), e),
            }
        }

        let mut publisher = Publisher::new(&self.config.path, self.precision, sink);
        for (name, stats, types) in &daemons {
            let prefix = MetricPath::from_segments([
                name.cluster.as_str(),
                name.daemon_type.as_str(),
                name.id.as_str(),
            ]);

            for (path, value) in flatten::flatten(stats, &prefix) {
                let metric = path.join(".");
                let Some(v) = value.as_f64() else {
                    warn!("Skipping non-numeric counter {}: {}", metric, value);
                    continue;
                };

                let counter_path = &path.segments()[prefix.len()..];
                match lookup_counter_type(types, counter_path) {
                    Some(bits) if is_counter(bits) => match self.counter_mode {
                        CounterMode::Raw => publisher.publish_raw_counter(&metric, v),
                        CounterMode::Delta => {
                            publisher.publish_counter(&metric, v, &mut self.counters);
                        }
                    },
                    _ => publisher.publish_gauge(&metric, v),
                }
            }
        }

        Ok(publisher.published())
    }

    fn counters(&self) -> Option<&CounterTracker> {
        (self.counter_mode == CounterMode::Delta).then_some(&self.counters)
    }
}
