//! Scan command implementation

use super::build_runtime;
use crate::config::Config;
use crate::error::Result;

/// Statistics from one manual scan pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    /// Workflow executions started by the tick
    pub started: usize,

    /// Workflow steps processed before backoffs took over
    pub steps: usize,
}

/// Run a single scan tick and drive whatever became due
///
/// Entities left mid-backoff stay persisted and continue on the next
/// invocation, so this command works as a cron-style drive of the whole
/// pipeline.
pub async fn cmd_scan(config: &Config) -> Result<ScanStats> {
    let runtime = build_runtime(config).await?;

    let started = runtime.scanner.tick().await;
    let steps = runtime.engine.run_once().await?;

    Ok(ScanStats { started, steps })
}

/// Print scan stats to console
pub fn print_scan_stats(stats: &ScanStats) {
    println!(
        "Scan complete: {} execution(s) started, {} step(s) processed",
        stats.started, stats.steps
    );
}
