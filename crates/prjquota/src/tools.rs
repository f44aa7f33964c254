// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Invocation of the privileged system tools that manage project quotas.
//!
//! Every kernel-facing mutation goes through one of a small set of fixed
//! command shapes. The shapes differ between the ext family and xfs; the
//! kind-specific ones live as methods on [`FsKind`].

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use crate::mount::FsKind;
use crate::{Error, Result};

#[cfg(test)]
#[path = "./tools_test.rs"]
mod tools_test;

/// A fully-formed external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub executable: OsString,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new<S: AsRef<OsStr>>(executable: S, args: Vec<OsString>) -> Self {
        Self {
            executable: executable.as_ref().to_owned(),
            args,
        }
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.executable.to_string_lossy())?;
        for arg in self.args.iter() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a completed tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code of the process, if it exited normally
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The process-execution capability used by the quota driver.
///
/// Implementations run the command to completion, blocking the calling
/// thread, and capture the exit status and both output streams.
pub trait ToolRunner: Send + Sync {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput>;
}

/// Runs tools as real subprocesses of this process.
#[derive(Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        tracing::debug!("running: {command}");
        let mut cmd = std::process::Command::new(&command.executable);
        cmd.args(command.args.iter());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        let output = cmd.output().map_err(|source| Error::ProcessSpawn {
            command: command.to_string(),
            source,
        })?;
        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Remount a filesystem with project quota accounting enabled.
///
/// The same invocation works for every supported kind.
pub fn remount_command(mountpoint: &Path) -> ToolCommand {
    ToolCommand::new(
        "mount",
        vec![
            "-o".into(),
            "remount,prjquota".into(),
            mountpoint.as_os_str().to_owned(),
        ],
    )
}

/// Turn project quota tracking on for a mountpoint (non-xfs only).
pub fn quota_on_command(mountpoint: &Path) -> ToolCommand {
    ToolCommand::new(
        "quotaon",
        vec!["-P".into(), mountpoint.as_os_str().to_owned()],
    )
}

/// List every project quota id known to the kernel, host-wide.
pub fn list_quota_ids_command() -> ToolCommand {
    ToolCommand::new("repquota", vec!["-Pan".into()])
}

/// Read the quota id tagged on the entries of a directory.
///
/// lsattr reports one line per entry: `<id> <attrs> <path>`.
pub fn read_quota_id_command(parent: &Path) -> ToolCommand {
    ToolCommand::new("lsattr", vec!["-p".into(), parent.as_os_str().to_owned()])
}

impl FsKind {
    /// Tag a directory with a quota id.
    pub fn bind_command(&self, dir: &Path, quota_id: u32) -> ToolCommand {
        match self {
            Self::Xfs => xfs_project_command(dir, quota_id),
            Self::Ext3 | Self::Ext4 => ToolCommand::new(
                "chattr",
                vec![
                    "-p".into(),
                    quota_id.to_string().into(),
                    "+P".into(),
                    dir.as_os_str().to_owned(),
                ],
            ),
        }
    }

    /// Tag a directory and all of its descendants with a quota id.
    ///
    /// `xfs_quota project -s` already walks the subtree, so xfs reuses the
    /// plain bind invocation.
    pub fn bind_recursive_command(&self, dir: &Path, quota_id: u32) -> ToolCommand {
        match self {
            Self::Xfs => xfs_project_command(dir, quota_id),
            Self::Ext3 | Self::Ext4 => ToolCommand::new(
                "chattr",
                vec![
                    "-R".into(),
                    "-p".into(),
                    quota_id.to_string().into(),
                    "+P".into(),
                    dir.as_os_str().to_owned(),
                ],
            ),
        }
    }

    /// Set the block limit for a quota id on a mountpoint.
    ///
    /// Soft and hard block limits are set equal; inode limits stay zero
    /// (unconstrained).
    pub fn set_limit_command(
        &self,
        quota_id: u32,
        block_limit_kb: u64,
        mountpoint: &Path,
    ) -> ToolCommand {
        match self {
            Self::Xfs => ToolCommand::new(
                "xfs_quota",
                vec![
                    "-x".into(),
                    "-c".into(),
                    format!("limit -p bsoft={block_limit_kb}k bhard={block_limit_kb}k {quota_id}")
                        .into(),
                    mountpoint.as_os_str().to_owned(),
                ],
            ),
            Self::Ext3 | Self::Ext4 => ToolCommand::new(
                "setquota",
                vec![
                    "-P".into(),
                    quota_id.to_string().into(),
                    block_limit_kb.to_string().into(),
                    block_limit_kb.to_string().into(),
                    "0".into(),
                    "0".into(),
                    mountpoint.as_os_str().to_owned(),
                ],
            ),
        }
    }
}

fn xfs_project_command(dir: &Path, quota_id: u32) -> ToolCommand {
    let script = format!("project -s -p {} {}", dir.display(), quota_id);
    ToolCommand::new("xfs_quota", vec!["-x".into(), "-c".into(), script.into()])
}
