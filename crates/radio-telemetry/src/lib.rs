//! # Radio Telemetry
//!
//! Observability for the Graphcast POI radio.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter, pretty or JSON output
//! - **Metrics**: Prometheus counters for the gossip pipeline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use radio_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = TelemetryConfig::from_env();
//!     init_telemetry(&config)?;
//!     // tracing macros and metric counters are now live
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RADIO_SERVICE_NAME` | `poi-radio` | Service name attached to logs |
//! | `RADIO_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `RADIO_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, register_metrics};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Install the log subscriber and register all radio metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Metrics first so that early log lines can already count events
    register_metrics()?;
    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}

/// Log a gossip-related event with the standard deployment and block fields.
///
/// # Example
///
/// ```rust,ignore
/// log_gossip_event!(warn, "Deployment unavailable", deployment, block, error = %e);
/// ```
#[macro_export]
macro_rules! log_gossip_event {
    ($level:ident, $msg:expr, $deployment:expr, $block:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            deployment = %$deployment,
            block = $block,
            $($($field)*,)?
            $msg
        )
    };
}
