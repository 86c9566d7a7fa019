use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ekp_config::PlatformArgs;
use ekp_graph::CloudAssembly;
use tracing::{info, instrument, Level};

/// Synthesize one template per stack plus the assembly manifest
///
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct SynthArgs {
    /// Directory the templates are written to
    #[arg(short, long, env = "EKP_OUTPUT_DIR", default_value = "cdk.out")]
    pub output: PathBuf,
}

impl SynthArgs {
    #[instrument(skip_all, err(level = Level::ERROR))]
    pub(super) async fn execute(self, platform: PlatformArgs) -> Result<()> {
        let profile = platform.resolve()?;
        let (graph, platform) = ::ekp_provider::build(&profile)?;
        info!(
            mode = %platform.overlay.mode,
            resources = graph.len(),
            edges = graph.edge_count(),
            "built deployment graph",
        );

        let assembly = CloudAssembly::synthesize(&graph)?;
        for path in assembly.write_to(&self.output)? {
            println!("{}", path.display());
        }
        Ok(())
    }
}
