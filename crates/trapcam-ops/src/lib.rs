//! Operational helpers: logging, usage and energy telemetry, status side channel.

mod energy;
mod feed;
mod usage;

pub use energy::EnergySampler;
pub use feed::{EventFeed, StatusBoard};
pub use usage::UsageLedger;

use trapcam_types::{config::OpsConfig, Result, TrapcamError};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.filter_directive())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TrapcamError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| TrapcamError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}
