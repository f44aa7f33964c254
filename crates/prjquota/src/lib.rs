// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Per-directory disk space quotas for container writable layers.
//!
//! This crate drives the Linux kernel's project quota mechanism on
//! ext3/ext4/xfs filesystems: it discovers the mounted filesystem backing
//! a directory, turns project quota accounting on for that filesystem,
//! allocates host-unique quota ids, binds directory subtrees to them, and
//! applies block limits, all through the same privileged system tools an
//! administrator would use by hand.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub mod fixtures;

pub mod bytefmt;
mod capacity;
pub mod config;
mod driver;
mod error;
pub mod mount;
pub mod tools;

pub use config::{Config, get_config, load_config};
pub use driver::PrjQuotaDriver;
pub use error::{Error, Result};
pub use mount::{FsKind, MountInfo};
