pub mod cell;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod filter;
pub mod render;
pub mod schema;
pub mod storage;
pub mod store;
pub mod task;
pub mod tasks;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::info;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting nlstore CLI");

    let data_dir = config::resolve_data_dir(cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = store::Store::open(&data_dir);

    commands::dispatch(&store, cli.command)?;

    info!("done");
    Ok(())
}
