// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

use std::path::Path;

use rstest::rstest;

use super::{FsKind, device_id, resolve, scan_table};
use crate::Error;
use crate::fixtures::*;

fn dev_map<'a>(entries: &'a [(&'a str, u64)]) -> impl Fn(&Path) -> Option<u64> + 'a {
    move |path: &Path| {
        entries
            .iter()
            .find(|(candidate, _)| Path::new(candidate) == path)
            .map(|(_, id)| *id)
    }
}

#[rstest]
fn test_scan_table_matches_device() {
    let table = "\
/dev/sda3 / ext4 rw,relatime,data=ordered 0 0
/dev/sdb1 /home/pouch ext4 rw,relatime,prjquota,data=ordered 0 0
tmpfs /run tmpfs rw,nosuid,nodev,mode=755 0 0
cgroup /sys/fs/cgroup/memory cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0
";
    let devs = [("/", 1), ("/home/pouch", 42)];
    let info = scan_table(table, 42, &dev_map(&devs)).expect("should match /home/pouch");
    assert_eq!(info.mountpoint, Path::new("/home/pouch"));
    assert_eq!(info.fs_kind, FsKind::Ext4);
    assert!(info.prjquota_enabled);

    let info = scan_table(table, 1, &dev_map(&devs)).expect("should match /");
    assert_eq!(info.mountpoint, Path::new("/"));
    assert!(!info.prjquota_enabled);
}

#[rstest]
fn test_scan_table_prefers_shortest_mountpoint() {
    // bind mounts produce several entries for the same device; the
    // closest ancestor (shortest path) must win regardless of order
    let table = "\
/dev/sdb1 /home/pouch/containers ext4 rw,relatime 0 0
/dev/sdb1 /home ext4 rw,relatime 0 0
/dev/sdb1 /home/pouch ext4 rw,relatime 0 0
";
    let devs = [
        ("/home/pouch/containers", 42),
        ("/home", 42),
        ("/home/pouch", 42),
    ];
    let info = scan_table(table, 42, &dev_map(&devs)).unwrap();
    assert_eq!(info.mountpoint, Path::new("/home"));
}

#[rstest]
fn test_scan_table_skips_malformed_lines() {
    let table = "\
/dev/sda1 /data ext4 rw,relatime 0
/dev/sda1 /data ext4 rw,relatime 0 0 extra

garbage
/dev/sda1 /data ext4 rw,relatime 0 0
";
    let devs = [("/data", 7)];
    let info = scan_table(table, 7, &dev_map(&devs)).unwrap();
    assert_eq!(info.mountpoint, Path::new("/data"));
}

#[rstest]
fn test_scan_table_only_supported_filesystems() {
    let table = "\
/dev/sda1 /data btrfs rw,relatime 0 0
/dev/sda1 /data ntfs rw,relatime 0 0
";
    let devs = [("/data", 7)];
    assert!(scan_table(table, 7, &dev_map(&devs)).is_none());
}

#[rstest]
fn test_fs_kind_mapping() {
    assert_eq!(FsKind::from_fs_type("ext3"), Some(FsKind::Ext3));
    assert_eq!(FsKind::from_fs_type("ext4"), Some(FsKind::Ext4));
    assert_eq!(FsKind::from_fs_type("xfs"), Some(FsKind::Xfs));
    assert_eq!(FsKind::from_fs_type("tmpfs"), None);
    assert_eq!(FsKind::Ext4.to_string(), "ext4");
    assert!(FsKind::Xfs.is_xfs());
    assert!(!FsKind::Ext3.is_xfs());
}

#[rstest]
fn test_device_id_stable_within_filesystem(tmpdir: tempfile::TempDir) {
    let file = tmpdir.path().join("probe");
    std::fs::write(&file, b"x").unwrap();
    assert_eq!(
        device_id(tmpdir.path()).unwrap(),
        device_id(&file).unwrap()
    );
}

#[rstest]
fn test_device_id_missing_path() {
    let err = device_id("/no/such/prjquota/path").unwrap_err();
    assert!(matches!(err, Error::PathStat { .. }));
}

#[rstest]
fn test_resolve_against_table_file(tmpdir: tempfile::TempDir) {
    let dir = tmpdir.path().join("c1");
    std::fs::create_dir(&dir).unwrap();
    let config = config_for_table(
        tmpdir.path(),
        &[ext4_line(tmpdir.path(), "rw,relatime,prjquota,data=ordered")],
    );

    let info = resolve(&dir, &config.quota.mounts_file).unwrap();
    assert_eq!(info.mountpoint, tmpdir.path());
    assert_eq!(info.fs_kind, FsKind::Ext4);
    assert!(info.prjquota_enabled);
    assert_eq!(info.device_id, device_id(&dir).unwrap());
}

#[rstest]
fn test_resolve_no_matching_mount(tmpdir: tempfile::TempDir) {
    let dir = tmpdir.path().join("c1");
    std::fs::create_dir(&dir).unwrap();
    // the only table entry points at a path that cannot be stat'ed
    let config = config_for_table(
        tmpdir.path(),
        &["/dev/sdz9 /no/such/mountpoint ext4 rw 0 0".to_owned()],
    );

    let err = resolve(&dir, &config.quota.mounts_file).unwrap_err();
    assert!(matches!(err, Error::MountpointNotFound { .. }));
}
