// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! The project quota driver.
//!
//! Sequences quota enablement, subtree binding and limit setting for a
//! directory, coordinating the kernel mount state, the privileged quota
//! tools and an in-process quota id allocator.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::tools::{SystemToolRunner, ToolCommand, ToolOutput, ToolRunner};
use crate::{Error, Result, bytefmt, capacity, mount, tools};

#[cfg(test)]
#[path = "./driver_test.rs"]
mod driver_test;

/// Substring of quotaon stderr that means tracking is already on.
///
/// Matching tool output text is fragile across tool locales, but it is the
/// only signal quotaon gives; activation must stay safe to retry.
const ALREADY_ACTIVE_MARKER: &str = "File exists";

/// Process-wide driver state, all behind one lock.
///
/// The lock is held only for in-memory checks and updates, never across a
/// tool invocation.
#[derive(Default)]
struct State {
    /// device id -> mountpoint, for devices already enforced
    mount_points: HashMap<u64, PathBuf>,
    /// device id -> total capacity in bytes
    device_limits: HashMap<u64, u64>,
    /// every quota id known to be in use on this host
    quota_ids: HashSet<u32>,
    /// marker of the most recently allocated id; scans resume here
    last_id: u32,
    /// whether the kernel's quota listing has been consumed yet
    ids_loaded: bool,
}

/// Allocates and enforces per-directory project quotas.
///
/// One driver instance owns the process-wide caches and should be shared
/// by all callers; every operation takes `&self` and may run concurrently.
pub struct PrjQuotaDriver {
    config: Config,
    runner: Box<dyn ToolRunner>,
    state: Mutex<State>,
}

impl PrjQuotaDriver {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, SystemToolRunner)
    }

    /// Create a driver that executes tools through the given runner.
    pub fn with_runner<R: ToolRunner + 'static>(config: Config, runner: R) -> Self {
        Self {
            config,
            runner: Box::new(runner),
            state: Mutex::new(State::default()),
        }
    }

    /// Cap the writable size of `dir`, returning the effective quota id.
    ///
    /// `size` is a human-readable size string such as "10G". A zero
    /// `quota_id` selects the id already tagged on the directory, or a
    /// freshly allocated one. Re-issuing with a new size overwrites the
    /// previous limit.
    pub fn set_disk_quota<P: AsRef<Path>>(
        &self,
        dir: P,
        size: &str,
        quota_id: u32,
    ) -> Result<u32> {
        let dir = dir.as_ref();
        tracing::debug!(?dir, size, quota_id, "set disk quota");

        // an oversized request must fail before any tool runs, so the
        // budget check precedes enablement
        let limit_kb = bytefmt::to_kilobytes(size)?;
        self.check_device_limit(dir, limit_kb.saturating_mul(1024))?;

        let mountpoint = self.enforce_quota(dir)?;
        let effective = self.set_subtree(dir, quota_id)?;
        if effective == 0 {
            return Err(Error::NoQuotaId {
                dir: dir.to_owned(),
            });
        }
        self.set_quota(effective, limit_kb, &mountpoint)?;
        Ok(effective)
    }

    /// Ensure project quota accounting is active on the device backing `dir`.
    ///
    /// Returns the mountpoint of that device. Idempotent: once a device has
    /// been enforced in this process the cached mountpoint is returned
    /// without touching the kernel again.
    pub fn enforce_quota<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tracing::debug!(?dir, "enforce project quota");

        let device_id = mount::device_id(dir)?;
        self.record_device_limit(dir, device_id)?;

        if let Some(mountpoint) = self.lock_state()?.mount_points.get(&device_id).cloned() {
            return Ok(mountpoint);
        }

        let info = mount::resolve(dir, &self.config.quota.mounts_file)?;
        if !info.prjquota_enabled {
            let command = tools::remount_command(&info.mountpoint);
            let output = self.runner.run(&command)?;
            if !output.success() {
                tracing::error!(
                    mountpoint = ?info.mountpoint,
                    stderr = %output.stderr,
                    "failed to remount with prjquota",
                );
                return Err(tool_failure(&command, output));
            }
        }

        if !info.fs_kind.is_xfs() {
            let command = tools::quota_on_command(&info.mountpoint);
            let output = self.runner.run(&command)?;
            if !output.success() && !output.stderr.contains(ALREADY_ACTIVE_MARKER) {
                tracing::error!(
                    mountpoint = ?info.mountpoint,
                    stderr = %output.stderr,
                    "failed to turn quota tracking on",
                );
                // invalidate any cached entry so a caller retry re-attempts
                // enablement instead of trusting a half-applied state
                self.lock_state()?.mount_points.remove(&device_id);
                return Err(tool_failure(&command, output));
            }
        }

        self.lock_state()?
            .mount_points
            .insert(device_id, info.mountpoint.clone());
        Ok(info.mountpoint)
    }

    /// Bind `dir` to a project quota id, returning the id actually bound.
    ///
    /// When `requested` is zero, an id already tagged on the directory is
    /// reused; otherwise a fresh one is allocated. The directory tag is
    /// persisted by the filesystem itself, not in process memory.
    pub fn set_subtree<P: AsRef<Path>>(&self, dir: P, requested: u32) -> Result<u32> {
        let dir = dir.as_ref();
        tracing::debug!(?dir, requested, "bind subtree to quota id");

        let mut quota_id = requested;
        if quota_id == 0 {
            quota_id = self.quota_id_in_file_attr(dir);
            if quota_id > 0 {
                return Ok(quota_id);
            }
            quota_id = self.next_quota_id()?;
        }

        let info = mount::resolve(dir, &self.config.quota.mounts_file)?;
        let command = info.fs_kind.bind_command(dir, quota_id);
        let output = self.runner.run(&command)?;
        tracing::info!(?dir, quota_id, exit = ?output.exit_code, "tagged directory");
        if !output.success() {
            return Err(tool_failure(&command, output));
        }
        Ok(quota_id)
    }

    /// Apply `quota_id` to `dir` and every descendant in one pass.
    ///
    /// Used when a whole subtree must be re-tagged, for example after
    /// rehydrating a directory from a snapshot.
    pub fn set_subtree_recursive<P: AsRef<Path>>(&self, dir: P, quota_id: u32) -> Result<()> {
        let dir = dir.as_ref();
        if quota_id == 0 {
            return Err(Error::NoQuotaId {
                dir: dir.to_owned(),
            });
        }

        let info = mount::resolve(dir, &self.config.quota.mounts_file)?;
        let command = info.fs_kind.bind_recursive_command(dir, quota_id);
        let output = self.runner.run(&command)?;
        tracing::info!(?dir, quota_id, exit = ?output.exit_code, "tagged subtree");
        if !output.success() {
            return Err(tool_failure(&command, output));
        }
        Ok(())
    }

    /// Set the block limit for `quota_id` on `mountpoint`.
    ///
    /// Soft and hard limits are set equal; inode counts stay unconstrained.
    /// Re-issuing with a new limit overwrites the previous one, which is
    /// the quota update path.
    pub fn set_quota(&self, quota_id: u32, block_limit_kb: u64, mountpoint: &Path) -> Result<()> {
        tracing::debug!(quota_id, block_limit_kb, ?mountpoint, "set project quota limit");
        let info = mount::resolve(mountpoint, &self.config.quota.mounts_file)?;
        let command = info
            .fs_kind
            .set_limit_command(quota_id, block_limit_kb, mountpoint);
        let output = self.runner.run(&command)?;
        tracing::info!(
            quota_id,
            block_limit_kb,
            ?mountpoint,
            exit = ?output.exit_code,
            "set limit",
        );
        if !output.success() {
            return Err(tool_failure(&command, output));
        }
        Ok(())
    }

    /// Read the quota id already tagged on `dir`, if any.
    ///
    /// Returns 0 when no id can be determined; valid ids are strictly
    /// positive.
    pub fn quota_id_in_file_attr(&self, dir: &Path) -> u32 {
        let parent = dir.parent().unwrap_or(dir);
        let command = tools::read_quota_id_command(parent);
        let output = match self.runner.run(&command) {
            Ok(output) if output.success() => output,
            Ok(output) => {
                tracing::warn!(?dir, stderr = %output.stderr, "lsattr failed reading quota id");
                return 0;
            }
            Err(err) => {
                tracing::warn!(?dir, %err, "could not run lsattr to read quota id");
                return 0;
            }
        };

        // example line: `16777256 --------------e---P /data/c1`
        for line in output.stdout.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() > 2 && Path::new(fields[2]) == dir {
                return fields[0].parse().unwrap_or(0);
            }
        }
        0
    }

    /// Return the next project quota id that is unused host-wide.
    ///
    /// Allocation is strictly serialized: the scan, the insertion into the
    /// in-use set and the marker update happen in one critical section, so
    /// two concurrent callers can never receive the same id.
    pub fn next_quota_id(&self) -> Result<u32> {
        self.ensure_quota_ids_loaded()?;

        let mut state = self.lock_state()?;
        let mut id = state.last_id.max(self.config.quota.min_id);
        loop {
            if id == u32::MAX {
                return Err(Error::QuotaIdsExhausted);
            }
            id += 1;
            if !state.quota_ids.contains(&id) {
                break;
            }
        }
        state.quota_ids.insert(id);
        state.last_id = id;
        tracing::debug!(quota_id = id, "allocated next project quota id");
        Ok(id)
    }

    /// Seed the in-use id set from the kernel's quota listing, once per
    /// process.
    fn ensure_quota_ids_loaded(&self) -> Result<()> {
        if self.lock_state()?.ids_loaded {
            return Ok(());
        }

        // run the listing outside the lock and merge under it; a racing
        // thread at worst runs the listing twice
        let command = tools::list_quota_ids_command();
        let output = self.runner.run(&command)?;
        if !output.success() {
            return Err(Error::QuotaListing {
                command: command.to_string(),
                stderr: output.stderr,
            });
        }
        let (ids, max_seen) = parse_quota_listing(&output.stdout);
        tracing::debug!(known = ids.len(), max_seen, "loaded existing quota ids");

        let mut state = self.lock_state()?;
        if !state.ids_loaded {
            state.quota_ids.extend(ids);
            state.last_id = state.last_id.max(max_seen);
            state.ids_loaded = true;
        }
        Ok(())
    }

    /// Record the assignable budget of the device backing `dir`, once.
    fn record_device_limit(&self, dir: &Path, device_id: u64) -> Result<u64> {
        if let Some(limit) = self.lock_state()?.device_limits.get(&device_id).copied() {
            return Ok(limit);
        }
        let limit = capacity::device_capacity(dir)?;
        tracing::debug!(?dir, device_id, limit, "recorded device capacity");
        self.lock_state()?.device_limits.insert(device_id, limit);
        Ok(limit)
    }

    /// Fail when a requested limit exceeds the device's assignable budget.
    fn check_device_limit(&self, dir: &Path, requested_bytes: u64) -> Result<()> {
        let device_id = mount::device_id(dir)?;
        let capacity_bytes = self.record_device_limit(dir, device_id)?;
        if requested_bytes > capacity_bytes {
            return Err(Error::CapacityExceeded {
                path: dir.to_owned(),
                requested_bytes,
                capacity_bytes,
            });
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|err| Error::LockPoisoned(err.to_string()))
    }
}

/// Parse `repquota -Pan` output into the set of ids in use and the highest
/// id seen.
///
/// Project rows look like `#16777216 -- 4 0 0 1 0 0`; everything else in
/// the report (headers, grace lines, separators) is ignored.
fn parse_quota_listing(listing: &str) -> (HashSet<u32>, u32) {
    let mut ids = HashSet::new();
    let mut max_seen = 0;
    for line in listing.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        let Some(raw) = first.strip_prefix('#') else {
            continue;
        };
        let Ok(id) = raw.parse::<u32>() else {
            continue;
        };
        ids.insert(id);
        max_seen = max_seen.max(id);
    }
    (ids, max_seen)
}

fn tool_failure(command: &ToolCommand, output: ToolOutput) -> Error {
    Error::ToolFailure {
        command: command.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}
