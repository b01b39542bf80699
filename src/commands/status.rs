//! Status command implementation

use super::build_runtime;
use crate::config::Config;
use crate::error::Result;
use crate::records::{EntityKind, PendingEntity, StatusCounts};
use crate::workflow::ExecutionCounts;
use tracing::info;

/// Status information
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub qdrant_url: String,
    pub chatbot_count: i64,
    pub documents: StatusCounts,
    pub dialogues: StatusCounts,
    pub executions: ExecutionCounts,
    pub pending: Vec<PendingEntity>,
}

/// Get system status
pub async fn cmd_status(config: &Config) -> Result<StatusInfo> {
    info!("Getting status");

    let runtime = build_runtime(config).await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        qdrant_url: config.vector.url.clone(),
        chatbot_count: runtime.records.chatbot_count().await?,
        documents: runtime.records.status_counts(EntityKind::Document).await?,
        dialogues: runtime.records.status_counts(EntityKind::Dialogue).await?,
        executions: runtime.engine.execution_counts().await?,
        pending: runtime.records.list_pending(10).await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\nragsync Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Qdrant: {}", status.qdrant_url);
    println!("\nChatbots: {}", status.chatbot_count);

    println!("\nDocuments:");
    print_counts(&status.documents);
    println!("Dialogues:");
    print_counts(&status.dialogues);

    println!("Executions:");
    println!(
        "  running: {}  completed: {}  failed: {}",
        status.executions.running, status.executions.completed, status.executions.failed
    );

    if !status.pending.is_empty() {
        println!("\nNext in queue:");
        for entity in &status.pending {
            println!("  {} {} (updated {})", entity.kind, entity.id, entity.updated_at);
        }
    }
}

fn print_counts(counts: &StatusCounts) {
    println!(
        "  total: {}  synced: {}  in progress: {}  waiting: {}  failed: {}",
        counts.total(),
        counts.synced,
        counts.in_progress,
        counts.not_synced,
        counts.failed
    );
}
