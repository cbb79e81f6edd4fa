use std::process::ExitCode;

use align_merge::app::{self, Cli};
use align_merge::AlignError;
use anyhow::Context;
use clap::Parser;
use log::{debug, info};

fn try_main(cli: Cli) -> anyhow::Result<()> {
    let cfg = cli.load_config().context("loading config")?;

    env_logger::Builder::new()
        .parse_filters(&cli.log_filter(&cfg))
        .parse_default_env()
        .init();

    let opts = cli.resolve(cfg);
    let stats = app::run(&opts)?;
    info!(
        "done: {} matches, {} inliers",
        stats.matches, stats.inliers
    );
    Ok(())
}

fn main() -> ExitCode {
    match try_main(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AlignError>() {
                // unreadable inputs keep the tool's historical one-line report on stdout
                Some(err @ AlignError::ReadImage { .. }) => {
                    println!("{err}");
                    debug!("{e:#}");
                }
                _ => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
