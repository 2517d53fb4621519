//! Collector settings.
//!
//! Every section has defaults matching a stock ceph/Linux host, so an empty
//! settings document is valid. The `statflat` binary loads an optional JSON
//! file and then applies command-line overrides on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Error type for loading settings.
#[derive(Debug)]
pub enum ConfigError {
    /// Settings file could not be read.
    Io(std::io::Error),
    /// Settings file is not valid JSON for [`Settings`].
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read settings: {}", e),
            ConfigError::Json(e) => write!(f, "invalid settings: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

/// How monotonic counters are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Running total as reported by the daemon. Downstream derives rates.
    #[default]
    Raw,
    /// Change since the previous sample. The first sample of each counter is
    /// only recorded, so a one-shot run needs `state_file` to emit anything.
    Delta,
}

/// Output settings shared by all collectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Decimal places used when rendering values.
    pub precision: u32,
    pub counters: CounterMode,
    /// Where previous counter samples are kept between runs in delta mode.
    pub state_file: Option<PathBuf>,
}

/// Admin-socket perf counter collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CephConfig {
    /// Metric path prefix.
    pub path: String,
    /// Directory holding the daemon admin sockets.
    pub socket_path: String,
    /// Extension of socket file names.
    pub socket_ext: String,
    /// Path to the `ceph` executable.
    pub ceph_binary: String,
}

impl Default for CephConfig {
    fn default() -> Self {
        Self {
            path: "ceph".to_string(),
            socket_path: "/var/run/ceph".to_string(),
            socket_ext: "asok".to_string(),
            ceph_binary: "/usr/bin/ceph".to_string(),
        }
    }
}

/// Pool statistics collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CephPoolStatsConfig {
    /// Metric path prefix.
    pub path: String,
    /// Path to the `ceph` executable.
    pub ceph_binary: String,
    /// Name of the cluster, passed as `--cluster` and used as metric prefix.
    pub cluster_name: String,
}

impl Default for CephPoolStatsConfig {
    fn default() -> Self {
        Self {
            path: "ceph".to_string(),
            ceph_binary: "/usr/bin/ceph".to_string(),
            cluster_name: "ceph".to_string(),
        }
    }
}

/// `/proc/uptime` collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptimeConfig {
    /// Metric path prefix.
    pub path: String,
    /// Base path to proc filesystem.
    pub proc_path: String,
}

impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            path: "uptime".to_string(),
            proc_path: "/proc".to_string(),
        }
    }
}

/// Complete settings document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub publish: PublishConfig,
    pub ceph: CephConfig,
    pub cephpoolstats: CephPoolStatsConfig,
    pub uptime: UptimeConfig,
}

impl Settings {
    /// Parses a JSON settings document. Missing keys keep their defaults.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads and parses a JSON settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.publish.precision, 0);
        assert_eq!(settings.publish.counters, CounterMode::Raw);
        assert_eq!(settings.publish.state_file, None);
        assert_eq!(settings.ceph.socket_path, "/var/run/ceph");
        assert_eq!(settings.ceph.socket_ext, "asok");
        assert_eq!(settings.ceph.ceph_binary, "/usr/bin/ceph");
        assert_eq!(settings.cephpoolstats.cluster_name, "ceph");
        assert_eq!(settings.uptime.path, "uptime");
        assert_eq!(settings.uptime.proc_path, "/proc");
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let doc = r#"{
            "ceph": {"socket_path": "/path/", "socket_ext": "ext"},
            "publish": {"precision": 2}
        }"#;
        let settings = Settings::from_json_str(doc).unwrap();

        assert_eq!(settings.ceph.socket_path, "/path/");
        assert_eq!(settings.ceph.socket_ext, "ext");
        assert_eq!(settings.ceph.ceph_binary, "/usr/bin/ceph");
        assert_eq!(settings.publish.precision, 2);
        assert_eq!(settings.cephpoolstats, CephPoolStatsConfig::default());
    }

    #[test]
    fn test_delta_counters_with_state_file() {
        let doc = r#"{
            "publish": {"counters": "delta", "state_file": "/var/lib/statflat/counters.json"}
        }"#;
        let settings = Settings::from_json_str(doc).unwrap();
        assert_eq!(settings.publish.counters, CounterMode::Delta);
        assert_eq!(
            settings.publish.state_file,
            Some(PathBuf::from("/var/lib/statflat/counters.json"))
        );

        let err = Settings::from_json_str(r#"{"publish": {"counters": "rate"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(Settings::from_json_str("{}").unwrap(), Settings::default());
    }

    #[test]
    fn test_invalid_document() {
        let err = Settings::from_json_str(r#"{"publish": {"precision": "high"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statflat.json");
        std::fs::write(&path, r#"{"cephpoolstats": {"cluster_name": "backup"}}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.cephpoolstats.cluster_name, "backup");

        let missing = Settings::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
