//! Worker command implementation

use super::build_runtime;
use crate::config::Config;
use crate::error::Result;
use std::time::Duration;
use tracing::info;

/// Run the scanner and the execution runner until the process is stopped
pub async fn cmd_worker(config: &Config) -> Result<()> {
    let runtime = build_runtime(config).await?;
    let poll = Duration::from_secs(config.sync.runner_poll_secs);

    info!("Starting sync worker");

    tokio::select! {
        result = runtime.scanner.run() => result,
        result = runtime.engine.run(poll) => result,
    }
}
