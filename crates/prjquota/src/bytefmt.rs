// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

//! Human-readable size strings as accepted on the command line and in
//! container configuration ("10G", "512m", "1.5TiB").
//!
//! Quota limits themselves are expressed in kilobyte block counts; this
//! module is the collaborator that converts operator input into them and
//! is not used anywhere else in the driver.

use crate::{Error, Result};

#[cfg(test)]
#[path = "./bytefmt_test.rs"]
mod bytefmt_test;

/// Convert a size string to a kilobyte count, rounding down.
pub fn to_kilobytes(size: &str) -> Result<u64> {
    Ok(to_bytes(size)? / 1024)
}

/// Convert a size string to a byte count.
///
/// A bare number is a byte count; B/K/M/G/T suffixes (optionally spelled
/// `KB`/`KiB` etc, case-insensitive) scale by powers of 1024.
pub fn to_bytes(size: &str) -> Result<u64> {
    let trimmed = size.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| Error::InvalidSize(size.to_owned()))?;
    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(Error::InvalidSize(size.to_owned())),
    };
    Ok((value * multiplier as f64) as u64)
}
