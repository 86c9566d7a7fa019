use anyhow::Result;
use clap::Parser;
use ekp_config::PlatformArgs;
use itertools::Itertools;
use tracing::{instrument, Level};

/// Print every ordering edge together with the reasons it exists
///
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct GraphArgs {
    /// Emit the edges as a JSON array
    #[arg(long)]
    pub json: bool,
}

impl GraphArgs {
    #[instrument(skip_all, err(level = Level::ERROR))]
    pub(super) async fn execute(self, platform: PlatformArgs) -> Result<()> {
        let profile = platform.resolve()?;
        let (graph, _) = ::ekp_provider::build(&profile)?;

        if self.json {
            let edges: Vec<_> = graph.edges().collect();
            println!("{}", ::serde_json::to_string_pretty(&edges)?);
        } else {
            for edge in graph.edges() {
                println!(
                    "{} -> {} [{}]",
                    edge.predecessor,
                    edge.successor,
                    edge.reasons.iter().join(", "),
                );
            }
        }
        Ok(())
    }
}
