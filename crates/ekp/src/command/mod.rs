#[cfg(feature = "aws")]
pub mod auto_mode;
pub mod config;
pub mod graph;
pub mod plan;
pub mod synth;

use anyhow::Result;
use clap::Subcommand;
use ekp_config::PlatformArgs;

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum Command {
    #[cfg(feature = "aws")]
    AutoMode(self::auto_mode::AutoModeArgs),
    Config(self::config::ConfigArgs),
    Graph(self::graph::GraphArgs),
    Plan(self::plan::PlanArgs),
    Synth(self::synth::SynthArgs),
}

impl Command {
    pub(super) async fn execute(self, platform: PlatformArgs) -> Result<()> {
        match self {
            #[cfg(feature = "aws")]
            Self::AutoMode(args) => args.execute().await,
            Self::Config(args) => args.execute(platform).await,
            Self::Graph(args) => args.execute(platform).await,
            Self::Plan(args) => args.execute(platform).await,
            Self::Synth(args) => args.execute(platform).await,
        }
    }
}
