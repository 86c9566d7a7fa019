mod args;
mod command;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

#[::tokio::main]
async fn main() -> ExitCode {
    let args = self::args::Args::parse();

    ::ekp_core::otel::init_once_with_level_int(args.verbose, true);
    info!("Welcome to EKS Platform!");

    match try_main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main(args: self::args::Args) -> Result<()> {
    debug!("Starting EKS Platform CLI");
    args.execute().await
}
