//! statflat-core: flattening collectors for a host metrics agent.
//!
//! Provides:
//! - `flatten` - nested statistics payload to ordered `(path, value)` pairs
//! - `metric` - metric sinks and the per-collector `Publisher`
//! - `counters` - counter sample tracking and delta computation
//! - `config` - collector settings with stock defaults
//! - `collector` - ceph admin-socket, ceph pool stats and uptime collectors

pub mod collector;
pub mod config;
pub mod counters;
pub mod flatten;
pub mod metric;
