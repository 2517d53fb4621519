//! In-memory fakes for testing collectors without `/proc` or a ceph cluster.
//!
//! `MockFs` simulates files and directories; `MockRunner` returns canned
//! command output keyed by the full argument vector and records every call.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::collector::traits::{CommandOutput, CommandRunner, FileSystem};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds an admin socket entry (an empty file) under `dir`.
    pub fn add_socket(&mut self, dir: impl AsRef<Path>, name: &str) {
        self.add_file(dir.as_ref().join(name), "");
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}

/// Canned reaction to one command line.
#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    /// The program cannot be started (e.g. missing binary).
    SpawnError(String),
}

/// Fake command runner.
///
/// Clones share the call log, so a test can keep one handle while the
/// collector owns another.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: HashMap<Vec<String>, MockResponse>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

fn argv(command: &[&str]) -> Vec<String> {
    command.iter().map(|s| s.to_string()).collect()
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `command` (program followed by arguments) succeed with `stdout`.
    pub fn respond(&mut self, command: &[&str], stdout: impl Into<String>) {
        self.responses
            .insert(argv(command), MockResponse::Output(CommandOutput::ok(stdout)));
    }

    /// Makes `command` exit with `code` and `stderr`.
    pub fn fail(&mut self, command: &[&str], code: i32, stderr: impl Into<String>) {
        self.responses.insert(
            argv(command),
            MockResponse::Output(CommandOutput::failed(code, stderr)),
        );
    }

    /// Makes `command` fail to start.
    pub fn spawn_error(&mut self, command: &[&str], message: impl Into<String>) {
        self.responses
            .insert(argv(command), MockResponse::SpawnError(message.into()));
    }

    /// Every command line run so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(program.to_string());
        command.extend(args.iter().cloned());

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        match self.responses.get(&command) {
            Some(MockResponse::Output(output)) => Ok(output.clone()),
            Some(MockResponse::SpawnError(message)) => {
                Err(io::Error::new(io::ErrorKind::NotFound, message.clone()))
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mock response for {:?}", command),
            )),
        }
    }
}
