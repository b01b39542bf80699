//! Sync command implementation

use super::build_runtime;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::records::EntityKind;
use crate::workflow::{EntityRef, StartOutcome};

/// Enqueue a sync for one entity right now and drive it
///
/// This is the "sync this entity now" surface the entity-creation and
/// entity-edit paths call; the scanner would pick the entity up anyway on
/// its next tick, this just skips the wait.
pub async fn cmd_sync(config: &Config, kind: EntityKind, id: &str) -> Result<StartOutcome> {
    let runtime = build_runtime(config).await?;

    // Fail with a useful message before touching the executions table
    match kind {
        EntityKind::Document => {
            runtime
                .records
                .get_document(id)
                .await?
                .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        }
        EntityKind::Dialogue => {
            runtime
                .records
                .get_dialogue(id)
                .await?
                .ok_or_else(|| Error::DialogueNotFound(id.to_string()))?;
        }
    }

    let outcome = runtime.engine.start(kind, id).await?;
    runtime.engine.run_once().await?;

    Ok(outcome)
}

/// Print sync outcome to console
pub fn print_sync_outcome(kind: EntityKind, id: &str, outcome: StartOutcome) {
    let key = EntityRef::new(kind, id).execution_key();
    match outcome {
        StartOutcome::Started => println!("Started sync execution {}", key),
        StartOutcome::AlreadyRunning => {
            println!("Sync execution {} is already running; nothing to do", key)
        }
    }
}
