// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("Failed to stat {path}")]
    PathStat { path: PathBuf, source: nix::Error },

    #[error("Failed to stat the filesystem of {path}")]
    FilesystemStat { path: PathBuf, source: nix::Error },

    #[error("Failed to read mount table {path}")]
    MountTableRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No supported mountpoint found for device {device_id} backing {path}")]
    MountpointNotFound { device_id: u64, path: PathBuf },

    #[error("Failed to spawn command: {command}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(
        "Command failed: {command}: exit: {exit_code:?}, stdout: {stdout}, stderr: {stderr}"
    )]
    ToolFailure {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error(
        "Requested quota of {requested_bytes} bytes exceeds the \
         {capacity_bytes} byte capacity of the device backing {path}"
    )]
    CapacityExceeded {
        path: PathBuf,
        requested_bytes: u64,
        capacity_bytes: u64,
    },

    #[error("Failed to list existing quota ids: {command}: {stderr}")]
    QuotaListing { command: String, stderr: String },

    #[error("The project quota id space is exhausted")]
    QuotaIdsExhausted,

    #[error("No usable quota id for {dir}")]
    NoQuotaId { dir: PathBuf },

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Lock has been poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    String(String),
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::String(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::String(err.to_owned())
    }
}
