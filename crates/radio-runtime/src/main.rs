//! `radio-node` - Graphcast POI radio.
//!
//! Every flag can also be set through the environment, see `radio-node --help`.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use radio_runtime::{NodeConfig, RadioRuntime};
use radio_telemetry::{encode_metrics, init_telemetry};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::parse();
    init_telemetry(&config.telemetry_config()).context("Failed to initialize telemetry")?;

    let runtime = RadioRuntime::new(&config).context("Failed to build the radio")?;
    let handle = runtime.start().await;

    info!("Radio is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown();
    if tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .is_err()
    {
        warn!("Radio loop did not stop in time");
    }

    match encode_metrics() {
        Ok(metrics) => debug!(metrics = %metrics, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }
    info!("Shutdown complete");
    Ok(())
}
