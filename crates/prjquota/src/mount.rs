// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Resolution of the mounted filesystem backing a directory.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./mount_test.rs"]
mod mount_test;

/// Default location of the kernel mount table.
pub const DEFAULT_MOUNTS_FILE: &str = "/proc/mounts";

/// The filesystem kinds that support project quotas.
///
/// The kind decides which external tool and argument syntax every
/// enablement, bind and limit operation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FsKind {
    #[strum(serialize = "ext3")]
    Ext3,
    #[strum(serialize = "ext4")]
    Ext4,
    #[strum(serialize = "xfs")]
    Xfs,
}

impl FsKind {
    /// Map a mount table fsType field to a supported kind, if any.
    pub fn from_fs_type(fs_type: &str) -> Option<Self> {
        match fs_type {
            "ext3" => Some(Self::Ext3),
            "ext4" => Some(Self::Ext4),
            "xfs" => Some(Self::Xfs),
            _ => None,
        }
    }

    /// Xfs activates quota tracking implicitly at mount time, so the
    /// explicit quotaon step does not apply to it.
    pub fn is_xfs(&self) -> bool {
        matches!(self, Self::Xfs)
    }
}

/// The mount table entry found to back a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Id of the block device, as reported by stat(2)
    pub device_id: u64,
    /// Path at which the device is mounted
    pub mountpoint: PathBuf,
    pub fs_kind: FsKind,
    /// Whether the mount options already include `prjquota`
    pub prjquota_enabled: bool,
}

/// Get the id of the device backing the given path.
pub fn device_id<P: AsRef<Path>>(path: P) -> Result<u64> {
    let path = path.as_ref();
    let st = nix::sys::stat::stat(path).map_err(|source| Error::PathStat {
        path: path.to_owned(),
        source,
    })?;
    Ok(st.st_dev)
}

/// Resolve the mount table entry whose device backs `path`.
///
/// This is a pure read of the mount table and device stat information,
/// safe to call repeatedly and concurrently.
pub fn resolve<P: AsRef<Path>>(path: P, mounts_file: &Path) -> Result<MountInfo> {
    let path = path.as_ref();
    let target = device_id(path)?;
    let table = std::fs::read_to_string(mounts_file).map_err(|source| Error::MountTableRead {
        path: mounts_file.to_owned(),
        source,
    })?;
    let found = scan_table(&table, target, &|mountpoint| device_id(mountpoint).ok());
    tracing::debug!(?path, device_id = target, found = ?found, "resolved mount");
    found.ok_or_else(|| Error::MountpointNotFound {
        device_id: target,
        path: path.to_owned(),
    })
}

/// Scan mount table text for the entry matching the target device id.
///
/// One line per mount: device, mountpoint, fsType, options, dump, pass.
/// Lines with any other field count are skipped, as are filesystem kinds
/// without project quota support. Bind mounts can produce several entries
/// for one device; the one with the shortest mountpoint path wins (the
/// closest ancestor).
fn scan_table(
    table: &str,
    target: u64,
    device_id_of: &dyn Fn(&Path) -> Option<u64>,
) -> Option<MountInfo> {
    let mut found: Option<MountInfo> = None;
    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            continue;
        }
        let Some(fs_kind) = FsKind::from_fs_type(fields[2]) else {
            continue;
        };
        let mountpoint = Path::new(fields[1]);
        if device_id_of(mountpoint) != Some(target) {
            continue;
        }
        if let Some(prev) = &found {
            if prev.mountpoint.as_os_str().len() <= fields[1].len() {
                continue;
            }
        }
        let prjquota_enabled = fields[3].split(',').any(|option| option == "prjquota");
        found = Some(MountInfo {
            device_id: target,
            mountpoint: mountpoint.to_owned(),
            fs_kind,
            prjquota_enabled,
        });
    }
    found
}
