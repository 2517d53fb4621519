//! Ceph per-pool I/O and recovery statistics.
//!
//! Runs `ceph --cluster=<name> osd pool stats --format=json`, which returns a
//! list of pool objects:
//!
//! ```text
//! [{"pool_id": 1, "pool_name": "rbd", "recovery": {}, "recovery_rate": {},
//!   "client_io_rate": {"read_bytes_sec": 4096, "op_per_sec": 3}}]
//! ```
//!
//! Each pool is published under `<cluster>.<pool_id>`, and the sum of every
//! metric across pools under `<cluster>`.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{info, warn};

use crate::collector::traits::CommandRunner;
use crate::collector::{CollectError, Collector, run_json};
use crate::config::CephPoolStatsConfig;
use crate::flatten::{NestedValue, Path as MetricPath, Scalar, flatten, flatten_root};
use crate::metric::{MetricSink, Publisher};

/// Converts a `pool_id` leaf into a metric path segment.
fn pool_id_segment(value: &Scalar) -> Option<String> {
    match value {
        Scalar::UInt(id) => Some(id.to_string()),
        Scalar::Int(id) if *id >= 0 => Some(id.to_string()),
        Scalar::Text(s) => s.trim().parse::<u64>().ok().map(|id| id.to_string()),
        _ => None,
    }
}

/// Sums every flattened metric across `pools`, keyed by dotted name.
///
/// Non-numeric leaves are left out of the sums.
pub fn sum_pool_stats(pools: &[NestedValue]) -> BTreeMap<String, f64> {
    let mut sums = BTreeMap::new();
    for pool in pools {
        for (path, value) in flatten_root(pool) {
            let metric = path.join(".");
            match value.as_f64() {
                Some(v) => *sums.entry(metric).or_insert(0.0) += v,
                None => warn!("Not summing non-numeric pool stat {}: {}", metric, value),
            }
        }
    }
    sums
}

/// Collects `osd pool stats` for one cluster.
pub struct CephPoolStatsCollector<R: CommandRunner> {
    runner: R,
    config: CephPoolStatsConfig,
    precision: u32,
}

impl<R: CommandRunner> CephPoolStatsCollector<R> {
    pub fn new(runner: R, config: CephPoolStatsConfig) -> Self {
        Self {
            runner,
            config,
            precision: 0,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    fn command_args(&self) -> Vec<String> {
        vec![
            format!("--cluster={}", self.config.cluster_name),
            "osd".to_string(),
            "pool".to_string(),
            "stats".to_string(),
            "--format=json".to_string(),
        ]
    }

    /// Fetches the pool list. Any failure is logged and yields no pools.
    pub fn get_stats(&self) -> Vec<NestedValue> {
        let json = match run_json(&self.runner, &self.config.ceph_binary, &self.command_args()) {
            Ok(json) => json,
            Err(e) => {
                info!("Could not get pool stats: {}", e);
                return Vec::new();
            }
        };

        let Value::Array(items) = json else {
            warn!("Could not get pool stats: expected a list of pools");
            return Vec::new();
        };

        let mut pools = Vec::with_capacity(items.len());
        for item in &items {
            if !item.is_object() {
                warn!("Skipping pool entry that is not an object");
                continue;
            }
            let (pool, errors) = NestedValue::from_json_lossy(item);
            for e in errors {
                warn!("Pool stats: {}", e);
            }
            pools.push(pool);
        }
        pools
    }
}

impl<R: CommandRunner> Collector for CephPoolStatsCollector<R> {
    fn name(&self) -> &'static str {
        "cephpoolstats"
    }

    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<usize, CollectError> {
        let cluster = self.config.cluster_name.as_str();
        let mut publisher = Publisher::new(&self.config.path, self.precision, sink);

        let mut pools = Vec::new();
        for mut pool in self.get_stats() {
            let pool_id = pool.remove("pool_id");
            pool.remove("pool_name");

            let Some(id) = pool_id
                .as_ref()
                .and_then(NestedValue::as_scalar)
                .and_then(pool_id_segment)
            else {
                warn!("Skipping pool without a numeric pool_id");
                continue;
            };

            let prefix = MetricPath::from_segments([cluster, id.as_str()]);
            publisher.publish_flat(&flatten(&pool, &prefix));
            pools.push(pool);
        }

        let sums: NestedValue = sum_pool_stats(&pools)
            .into_iter()
            .map(|(name, total)| (name, Scalar::Float(total)))
            .collect();
        publisher.publish_flat(&flatten(&sums, &MetricPath::from_segments([cluster])));

        Ok(publisher.published())
    }
}
