// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Device capacity probing for the quota budget pre-check.

use std::path::Path;

use crate::{Error, Result};

/// Total size in bytes of the filesystem holding `path`.
///
/// This is the assignable budget for quota limits on that device; a limit
/// larger than the device itself could never be honored.
pub fn device_capacity(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(|source| Error::FilesystemStat {
        path: path.to_owned(),
        source,
    })?;
    Ok((stat.blocks() as u64).saturating_mul(stat.fragment_size() as u64))
}
