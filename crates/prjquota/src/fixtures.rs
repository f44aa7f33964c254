// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Shared helpers for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rstest::fixture;

use crate::Result;
use crate::config::Config;
use crate::tools::{ToolCommand, ToolOutput, ToolRunner};

#[fixture]
pub fn tmpdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("prjquota-")
        .tempdir()
        .expect("failed to create a temp directory for testing")
}

/// A tool runner that records every invocation and replies from a
/// per-executable script.
///
/// Executables with no scripted response succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<ToolCommand>>,
    responses: Mutex<HashMap<String, VecDeque<ToolOutput>>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for the next invocation of `executable`.
    pub fn respond(&self, executable: &str, output: ToolOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(executable.to_owned())
            .or_default()
            .push_back(output);
    }

    pub fn respond_ok(&self, executable: &str, stdout: &str) {
        self.respond(
            executable,
            ToolOutput {
                exit_code: Some(0),
                stdout: stdout.to_owned(),
                stderr: String::new(),
            },
        );
    }

    pub fn respond_fail(&self, executable: &str, exit_code: i32, stderr: &str) {
        self.respond(
            executable,
            ToolOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: stderr.to_owned(),
            },
        );
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded invocations of `executable`.
    pub fn calls_to(&self, executable: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.executable.to_string_lossy() == executable)
            .count()
    }

    /// The most recent invocation of `executable`, if any.
    pub fn last_call_to(&self, executable: &str) -> Option<ToolCommand> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|call| call.executable.to_string_lossy() == executable)
            .cloned()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let name = command.executable.to_string_lossy().into_owned();
        let output = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ToolOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            });
        Ok(output)
    }
}

impl ToolRunner for Arc<ScriptedRunner> {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        self.as_ref().run(command)
    }
}

/// Write a mount table with the given lines into `dir` and return a config
/// pointing the resolver at it.
pub fn config_for_table(dir: &Path, lines: &[String]) -> Config {
    let table = dir.join("mounts");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&table, content).expect("failed to write test mount table");
    let mut config = Config::default();
    config.quota.mounts_file = table;
    config
}

pub fn ext4_line(mountpoint: &Path, options: &str) -> String {
    format!("/dev/sdb1 {} ext4 {} 0 0", mountpoint.display(), options)
}

pub fn xfs_line(mountpoint: &Path, options: &str) -> String {
    format!("/dev/sdb1 {} xfs {} 0 0", mountpoint.display(), options)
}
