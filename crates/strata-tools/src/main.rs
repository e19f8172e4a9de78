//! # strata-maps
//!
//! Inspects and maintains the map files of a Strata world.
//!
//! ```text
//! strata-maps [--config <path>] scan <world-root>
//! strata-maps [--config <path>] compact <world-root>
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod commands;
mod survey;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use strata_world::{MapConfig, MapLayout};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "usage: strata-maps [--config <path>] <scan|compact> <world-root>";

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    command: String,
    world_root: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut config = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = Some(PathBuf::from(args.next().context("--config needs a path")?));
        } else {
            positional.push(arg);
        }
    }
    let [command, world_root]: [String; 2] = match positional.try_into() {
        Ok(pair) => pair,
        Err(_) => bail!(USAGE),
    };
    Ok(Args {
        config,
        command,
        world_root: PathBuf::from(world_root),
    })
}

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("strata=info".parse()?))
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let mut config = args.config.map(MapConfig::load_from).unwrap_or_default();
    config.world_root = args.world_root;

    match args.command.as_str() {
        "scan" => {
            let summary = commands::scan(&MapLayout::new(config.world_root))?;
            println!("{summary:#?}");
        },
        "compact" => {
            let report = commands::compact(config)?;
            info!("Compaction finished");
            println!("{report:#?}");
            if !report.is_complete() {
                bail!("{} quads failed to save", report.failed.len());
            }
        },
        other => bail!("unknown command `{other}`\n{USAGE}"),
    }
    Ok(())
}
