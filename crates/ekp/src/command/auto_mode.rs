use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ekp_automode::{AutoModeHandler, EksComputeApi};
use serde_json::Value;
use tokio::fs;
use tracing::{instrument, Level};

/// Handle one Auto Mode custom resource event against the live EKS API
///
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct AutoModeArgs {
    /// JSON file holding the custom resource request
    #[arg(long)]
    pub event: PathBuf,
}

impl AutoModeArgs {
    #[instrument(skip_all, err(level = Level::ERROR))]
    pub(super) async fn execute(self) -> Result<()> {
        let event: Value = ::serde_json::from_slice(&fs::read(&self.event).await?)?;

        let handler = AutoModeHandler::new(EksComputeApi::from_env().await);
        let response = handler.on_json(event).await?;
        println!("{}", ::serde_json::to_string_pretty(&response)?);
        Ok(())
    }
}
