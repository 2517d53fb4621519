//! Abstractions over the filesystem and external commands.
//!
//! Collectors read `/proc` files, list admin-socket directories and run the
//! `ceph` binary. Going through these traits lets the same code run against
//! the real system or against the in-memory fakes in [`super::mock`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// A vector of paths to entries in the directory, or an I/O error.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs an external program with a fixed argument list (no shell).
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to finish.
    ///
    /// An `Err` means the program could not be started at all; a non-zero
    /// exit is reported through [`CommandOutput::success`].
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runner backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealRunner;

impl RealRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_read_to_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uptime");
        std::fs::write(&path, "600.0 300.0\n").unwrap();

        let fs = RealFs::new();
        assert_eq!(fs.read_to_string(&path).unwrap(), "600.0 300.0\n");
    }

    #[test]
    fn test_real_fs_read_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ceph-osd.0.asok"), "").unwrap();
        std::fs::write(dir.path().join("ceph-mon.a.asok"), "").unwrap();

        let fs = RealFs::new();
        let mut entries = fs.read_dir(dir.path()).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                dir.path().join("ceph-mon.a.asok"),
                dir.path().join("ceph-osd.0.asok"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_captures_exit_status() {
        let runner = RealRunner::new();
        let ok = runner.run("true", &[]).unwrap();
        assert!(ok.success);
        assert_eq!(ok.code, Some(0));

        let failed = runner.run("false", &[]).unwrap();
        assert!(!failed.success);
    }

    #[test]
    fn test_real_runner_missing_program() {
        let runner = RealRunner::new();
        assert!(runner.run("/nonexistent/statflat-binary", &[]).is_err());
    }
}
