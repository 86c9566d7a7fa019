use anyhow::Result;
use clap::Parser;
use ekp_config::PlatformArgs;
use tracing::{instrument, Level};

/// Print the resolved environment profile as JSON
///
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct ConfigArgs {}

impl ConfigArgs {
    #[instrument(skip_all, err(level = Level::ERROR))]
    pub(super) async fn execute(self, platform: PlatformArgs) -> Result<()> {
        let profile = platform.resolve()?;
        println!("{}", ::serde_json::to_string_pretty(&profile)?);
        Ok(())
    }
}
