//! Durable sync workflow
//!
//! One workflow execution exists per entity at a time, keyed by entity kind
//! and ID. The engine persists a checkpoint after every completed step, so
//! activities are at-least-once: a crash between an activity's effect and
//! its checkpoint re-executes the activity, and every activity is written
//! to be safe under re-execution (status re-writes, overwrite-based index
//! upserts).
//!
//! Activities exchange serializable DTOs only. No live database or client
//! handle crosses the step boundary, which keeps a persisted execution
//! resumable by any worker process.

mod activities;
mod engine;

pub use activities::*;
pub use engine::*;

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::records::{EmbeddingModelConfig, EntityKind};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Retry policy for one class of workflow step
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_secs(config.initial_secs),
            max_interval: Duration::from_secs(config.max_secs),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Exponential backoff delay after the given number of failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let delay = self.initial_interval.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_interval)
    }
}

/// Step policies shared by all executions
///
/// External calls (OCR, embedding, index writes) get the long policy;
/// status writes against the local store get the tight one.
#[derive(Debug, Clone)]
pub struct SyncPolicies {
    pub external: RetryPolicy,
    pub status: RetryPolicy,
    pub step_timeout: Duration,
}

impl SyncPolicies {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            external: RetryPolicy::from_config(&config.external_retry),
            status: RetryPolicy::from_config(&config.status_retry),
            step_timeout: Duration::from_secs(config.step_timeout_secs),
        }
    }
}

/// Reference to the entity a workflow is synchronizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    /// Deterministic execution key; the primary key of the executions table
    pub fn execution_key(&self) -> String {
        format!("{}-sync-{}", self.kind, self.id)
    }
}

/// Chatbot snapshot carried between steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatbotDto {
    pub id: String,
    pub name: String,
    pub embedding: EmbeddingModelConfig,
}

/// Outcome of the content-acquisition step
///
/// "Nothing to index" is data, not an exception: the workflow branches on
/// `Skipped` and marks the entity SYNCED with the reason instead of
/// treating an unsupported upload as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquiredContent {
    Text(String),
    Skipped(String),
}

/// Checkpointed workflow steps
///
/// The persisted value names the last completed step; the engine runs
/// whatever comes next. `Failing` is entered from any step whose retries
/// are exhausted and exists so the FAILED status write itself survives a
/// crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Marked,
    Acquired,
    Indexed,
    Failing,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Start => write!(f, "start"),
            Step::Marked => write!(f, "marked"),
            Step::Acquired => write!(f, "acquired"),
            Step::Indexed => write!(f, "indexed"),
            Step::Failing => write!(f, "failing"),
        }
    }
}

impl FromStr for Step {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Step::Start),
            "marked" => Ok(Step::Marked),
            "acquired" => Ok(Step::Acquired),
            "indexed" => Ok(Step::Indexed),
            "failing" => Ok(Step::Failing),
            _ => Err(Error::Other(format!("Unknown workflow step: {}", s))),
        }
    }
}

/// DTOs accumulated across steps, persisted with each checkpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatbot: Option<ChatbotDto>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<AcquiredContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_chunks: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Result of asking the engine to start a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_key_is_deterministic() {
        let a = EntityRef::new(EntityKind::Document, "abc-123");
        let b = EntityRef::new(EntityKind::Document, "abc-123");
        assert_eq!(a.execution_key(), b.execution_key());
        assert_eq!(a.execution_key(), "document-sync-abc-123");

        let d = EntityRef::new(EntityKind::Dialogue, "abc-123");
        assert_ne!(a.execution_key(), d.execution_key());
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            max_attempts: 5,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(20));
        assert_eq!(policy.backoff(4), Duration::from_secs(40));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(12), Duration::from_secs(60));
    }

    #[test]
    fn test_step_round_trip() {
        for step in [
            Step::Start,
            Step::Marked,
            Step::Acquired,
            Step::Indexed,
            Step::Failing,
        ] {
            assert_eq!(step.to_string().parse::<Step>().unwrap(), step);
        }
    }

    #[test]
    fn test_step_data_round_trip() {
        let data = StepData {
            chatbot: None,
            content: Some(AcquiredContent::Skipped("not supported".to_string())),
            indexed_chunks: None,
            failure: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        let parsed: StepData = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.content,
            Some(AcquiredContent::Skipped("not supported".to_string()))
        );
    }
}
