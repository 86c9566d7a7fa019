use anyhow::Result;
use clap::{ArgAction, Parser};
use ekp_config::PlatformArgs;

#[derive(Clone, Debug, PartialEq, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(flatten)]
    pub platform: PlatformArgs,

    /// Increase logging verbosity (`-v` info, `-vv` debug, `-vvv` trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: crate::command::Command,
}

impl Args {
    pub(super) async fn execute(self) -> Result<()> {
        self.command.execute(self.platform).await
    }
}
