//! Parsers for collector inputs that are not JSON.
//!
//! These are pure functions over string inputs, testable without any
//! filesystem or subprocess.

use std::path::Path;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parsed data from `/proc/uptime`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Uptime {
    /// Seconds since boot.
    pub uptime: f64,
    /// Seconds spent idle, summed over all CPUs.
    pub idle: f64,
}

/// Parses `/proc/uptime` content.
///
/// Format: `uptime_seconds idle_seconds`
pub fn parse_uptime(content: &str) -> Result<Uptime, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(ParseError::new("invalid uptime format"));
    }

    let uptime = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid uptime"))?;
    let idle = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid idle time"))?;

    Ok(Uptime { uptime, idle })
}

/// Identity of a ceph daemon derived from its admin socket file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketName {
    pub cluster: String,
    pub daemon_type: String,
    pub id: String,
}

/// Parses an admin socket path of the form `<cluster>-<type>.<id>.<ext>`.
///
/// `/var/run/ceph/cephadoodle-osd.325.asok` gives cluster `cephadoodle`,
/// type `osd`, id `325`. The cluster name may itself contain dashes; the
/// last dash before the type is the separator.
pub fn parse_socket_name(path: &Path) -> Option<SocketName> {
    let stem = path.file_stem()?.to_str()?;
    let (name, id) = stem.rsplit_once('.')?;
    let (cluster, daemon_type) = name.rsplit_once('-')?;

    if cluster.is_empty() || daemon_type.is_empty() || id.is_empty() {
        return None;
    }

    Some(SocketName {
        cluster: cluster.to_string(),
        daemon_type: daemon_type.to_string(),
        id: id.to_string(),
    })
}
