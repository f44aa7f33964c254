// Copyright (c) Contributors to the prjquota project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/prjquota/prjquota

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use prjquota::{PrjQuotaDriver, load_config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Manage per-directory disk space quotas using Linux project quotas.
#[derive(Parser)]
#[clap(name = "prjquota", version)]
struct Opt {
    /// Make output more verbose (can be specified multiple times)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cap the writable size of a directory
    Set(CmdSet),
    /// Enable project quota accounting on the filesystem backing a directory
    Enforce(CmdEnforce),
}

#[derive(Parser)]
struct CmdSet {
    /// The directory to limit
    dir: PathBuf,

    /// The size limit, eg "10G" or "512M"
    size: String,

    /// Use this project quota id instead of discovering or allocating one
    #[clap(long, default_value_t = 0)]
    quota_id: u32,
}

#[derive(Parser)]
struct CmdEnforce {
    /// A directory on the filesystem to enforce
    dir: PathBuf,
}

fn configure_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "prjquota=info",
        1 => "prjquota=debug",
        _ => "prjquota=trace",
    };
    let filter = std::env::var("PRJQUOTA_LOG").unwrap_or_else(|_| default_filter.to_owned());
    let env_filter = tracing_subscriber::filter::EnvFilter::new(filter);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    configure_logging(opt.verbose);

    let config = load_config()?;
    tracing::debug!(min_id = config.quota.min_id, "loaded configuration");
    let driver = PrjQuotaDriver::new(config);

    match opt.command {
        Command::Set(cmd) => {
            let quota_id = driver.set_disk_quota(&cmd.dir, &cmd.size, cmd.quota_id)?;
            println!("{quota_id}");
        }
        Command::Enforce(cmd) => {
            let mountpoint = driver.enforce_quota(&cmd.dir)?;
            println!("{}", mountpoint.display());
        }
    }
    Ok(())
}
