// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static CONFIG: OnceCell<RwLock<Arc<Config>>> = OnceCell::new();

/// Settings for quota id allocation and mount discovery.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Quota {
    /// Lowest project quota id the allocator will hand out.
    ///
    /// Ids below this floor are reserved for manual and system use.
    pub min_id: u32,

    /// Location of the kernel mount table.
    pub mounts_file: PathBuf,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            min_id: 16_777_216,
            mounts_file: crate::mount::DEFAULT_MOUNTS_FILE.into(),
        }
    }
}

/// Configuration values for the quota driver.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub quota: Quota,
}

impl Config {
    /// Get the current loaded config, loading it if needed.
    pub fn current() -> Result<Arc<Self>> {
        get_config()
    }

    /// Load the config from disk, even if it's already been loaded before.
    pub fn load() -> Result<Self> {
        load_config()
    }

    /// Make this config the current global one.
    pub fn make_current(self) -> Result<Arc<Self>> {
        // Note we don't know if we won the race to set the value here,
        // so we still need to try to update it.
        let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
            Ok(RwLock::new(Arc::new(self.clone())))
        })?;

        let mut lock = config
            .write()
            .map_err(|err| crate::Error::LockPoisoned(err.to_string()))?;
        *Arc::make_mut(&mut lock) = self;
        Ok(Arc::clone(&lock))
    }
}

/// Get the current config, fetching it from disk if needed.
pub fn get_config() -> Result<Arc<Config>> {
    let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
        Ok(RwLock::new(Arc::new(load_config()?)))
    })?;
    let lock = config
        .read()
        .map_err(|err| crate::Error::LockPoisoned(err.to_string()))?;
    Ok(Arc::clone(&*lock))
}

/// Load the configuration from disk.
///
/// This includes the system and user configurations, if they exist, plus
/// `PRJQUOTA_<SECTION>_<NAME>` environment overrides.
pub fn load_config() -> Result<Config> {
    use config::{Config as RawConfig, File};

    let mut config_builder = RawConfig::builder()
        // the system config can be in any supported format: toml, yaml, json, ini, etc
        .add_source(File::with_name("/etc/prjquota").required(false));

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("prjquota/config")) {
        config_builder = config_builder
            .add_source(File::with_name(&user_config.to_string_lossy()).required(false));
    }

    for (var, value) in std::env::vars() {
        let Some(tail) = var.strip_prefix("PRJQUOTA_") else {
            continue;
        };
        let Some((section, name)) = tail.split_once('_') else {
            // typically, a value with no section is not a configuration
            // value, and can be skipped (eg: PRJQUOTA_LOG)
            continue;
        };

        let key = format!("{}.{}", section.to_lowercase(), name.to_lowercase());
        config_builder = config_builder.set_override(key, value)?;
    }

    let config = config_builder.build()?;
    Ok(Config::deserialize(config)?)
}
