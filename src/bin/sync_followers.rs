//! Run one reconciliation pass against the current follower list and exit.

use anyhow::{Context, Result};
use tracing::info;

use fortune_labeler::utils::init_logging;
use fortune_labeler::{Labeler, LabelerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let config = LabelerConfig::from_env().context("Invalid labeler configuration")?;
    info!("== Starting follower sync ==");
    info!("DB path: {}", config.db_path.display());
    info!("Labeler DID: {}", config.labeler_did);

    let labeler = Labeler::build(config).await.context("Failed to start labeler")?;
    let report = labeler.engine.run_pass().await.context("Sync aborted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.failed.is_empty() {
        info!("{} identities failed and will be retried on the next pass", report.failed.len());
    }
    Ok(())
}
