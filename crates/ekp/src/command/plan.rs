use anyhow::Result;
use clap::Parser;
use ekp_config::PlatformArgs;
use tracing::{instrument, Level};

/// Print the deployment waves, one resource per line
///
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct PlanArgs {
    /// Print tear-down order instead
    #[arg(long)]
    pub teardown: bool,
}

impl PlanArgs {
    #[instrument(skip_all, err(level = Level::ERROR))]
    pub(super) async fn execute(self, platform: PlatformArgs) -> Result<()> {
        let profile = platform.resolve()?;
        let (graph, _) = ::ekp_provider::build(&profile)?;

        if self.teardown {
            for id in graph.teardown_order() {
                println!("{id}");
            }
            return Ok(());
        }

        for (index, wave) in graph.waves().iter().enumerate() {
            println!("wave {index}:");
            for id in wave {
                let kind = graph
                    .resource(id)
                    .map(|resource| resource.kind.type_name())
                    .unwrap_or_default();
                println!("  {id} ({kind})");
            }
        }
        Ok(())
    }
}
