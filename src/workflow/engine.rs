//! Durable execution engine
//!
//! Executions live in the `sync_executions` table. The primary key is the
//! deterministic execution key, which is what makes starting a workflow
//! idempotent: a second start while one is running is a no-op, and no two
//! executions for the same entity can ever run at once.
//!
//! The runner claims due executions under a short lease, drives exactly one
//! step per claim, and persists the checkpoint before the row becomes
//! claimable again. Retry backoff is a timestamp gate on the row, not an
//! in-process sleep, so pending retries survive worker restarts.

use super::{
    Activities, AcquiredContent, EntityRef, RetryPolicy, StartOutcome, Step, StepData,
    SyncPolicies,
};
use crate::error::{Error, Result};
use crate::records::{EntityKind, RecordStore};
use chrono::Utc;
use sqlx::FromRow;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Rows claimed per runner pass
const CLAIM_BATCH: usize = 16;

/// Slack added to the step timeout when leasing a claimed row
const LEASE_SLACK: Duration = Duration::from_secs(30);

/// Terminal and non-terminal execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecState::Running => write!(f, "running"),
            ExecState::Completed => write!(f, "completed"),
            ExecState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ExecState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ExecState::Running),
            "completed" => Ok(ExecState::Completed),
            "failed" => Ok(ExecState::Failed),
            _ => Err(Error::Other(format!("Unknown execution state: {}", s))),
        }
    }
}

/// One persisted workflow execution
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub state: String,
    pub step: String,
    pub step_data: Option<String>,
    pub attempt: i64,
    pub next_attempt_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Execution backlog counts
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCounts {
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

enum StepResult<T> {
    Done(T),
    Backoff,
    Failed(String),
}

/// The durable execution engine
#[derive(Clone)]
pub struct SyncEngine {
    records: RecordStore,
    activities: Activities,
    policies: SyncPolicies,
}

impl SyncEngine {
    pub fn new(records: RecordStore, activities: Activities, policies: SyncPolicies) -> Self {
        Self {
            records,
            activities,
            policies,
        }
    }

    /// Start (or no-op) a workflow execution for an entity
    ///
    /// The entity's execution key is the row's primary key; a running
    /// execution absorbs the start, while a terminal one is reset and
    /// restarted from the first step.
    pub async fn start(&self, kind: EntityKind, id: &str) -> Result<StartOutcome> {
        let key = EntityRef::new(kind, id).execution_key();
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO sync_executions (id, entity_kind, entity_id, state, step, attempt, created_at, updated_at)
            VALUES (?, ?, ?, 'running', 'start', 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = 'running',
                step = 'start',
                step_data = NULL,
                attempt = 0,
                next_attempt_at = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            WHERE sync_executions.state != 'running'
            "#,
        )
        .bind(&key)
        .bind(kind.to_string())
        .bind(id)
        .bind(&now)
        .bind(&now)
        .execute(self.records.pool())
        .await?;

        if result.rows_affected() == 1 {
            debug!("Started sync execution {}", key);
            Ok(StartOutcome::Started)
        } else {
            debug!("Sync execution {} already running", key);
            Ok(StartOutcome::AlreadyRunning)
        }
    }

    /// Run the claim/drive loop forever
    pub async fn run(&self, poll: Duration) -> Result<()> {
        info!("Execution runner started, polling every {:?}", poll);
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                warn!("Execution runner pass failed: {}", e);
            }
        }
    }

    /// Drive every due execution until none are immediately claimable
    ///
    /// Returns the number of steps processed. Executions waiting on a
    /// retry backoff are left for a later pass.
    pub async fn run_once(&self) -> Result<usize> {
        let mut processed = 0;

        loop {
            let batch = self.claim_batch(CLAIM_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            processed += batch.len();

            let mut tasks = JoinSet::new();
            for exec in batch {
                let engine = self.clone();
                tasks.spawn(async move {
                    let id = exec.id.clone();
                    if let Err(e) = engine.drive(exec).await {
                        warn!("Driving execution {} failed: {}", id, e);
                        if !e.is_retryable() {
                            if let Err(abandon_err) = engine.abandon(&id, &e.to_string()).await {
                                warn!(
                                    "Could not abandon broken execution {}: {}",
                                    id, abandon_err
                                );
                            }
                        }
                    }
                });
            }
            while tasks.join_next().await.is_some() {}
        }

        Ok(processed)
    }

    /// Fetch one execution by key
    pub async fn get_execution(&self, key: &str) -> Result<Option<ExecutionRow>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM sync_executions WHERE id = ?")
            .bind(key)
            .fetch_optional(self.records.pool())
            .await?;
        Ok(row)
    }

    /// Backlog counts by state
    pub async fn execution_counts(&self) -> Result<ExecutionCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM sync_executions GROUP BY state")
                .fetch_all(self.records.pool())
                .await?;

        let mut counts = ExecutionCounts::default();
        for (state, count) in rows {
            match state.parse::<ExecState>()? {
                ExecState::Running => counts.running = count,
                ExecState::Completed => counts.completed = count,
                ExecState::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// Claim up to `limit` due executions under a lease
    ///
    /// The guarded per-row UPDATE makes claims safe across concurrent
    /// workers sharing the database: whoever flips `next_attempt_at`
    /// first owns the row until the lease elapses.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<ExecutionRow>> {
        let now = Utc::now().to_rfc3339();
        let candidates = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM sync_executions
            WHERE state = 'running' AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(&now)
        .bind(limit as i64)
        .fetch_all(self.records.pool())
        .await?;

        let lease = self.policies.step_timeout + LEASE_SLACK;
        let mut claimed = Vec::with_capacity(candidates.len());

        for mut exec in candidates {
            let lease_until = rfc3339_after(lease);
            let result = sqlx::query(
                r#"
                UPDATE sync_executions SET next_attempt_at = ?, updated_at = ?
                WHERE id = ? AND state = 'running' AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
                "#,
            )
            .bind(&lease_until)
            .bind(&now)
            .bind(&exec.id)
            .bind(&now)
            .execute(self.records.pool())
            .await?;

            if result.rows_affected() == 1 {
                exec.next_attempt_at = Some(lease_until);
                claimed.push(exec);
            }
        }

        Ok(claimed)
    }

    /// Advance one execution by exactly one step
    async fn drive(&self, mut exec: ExecutionRow) -> Result<()> {
        let kind: EntityKind = exec.entity_kind.parse()?;
        let entity = EntityRef::new(kind, &exec.entity_id);
        let mut data: StepData = match &exec.step_data {
            Some(json) => serde_json::from_str(json)?,
            None => StepData::default(),
        };
        let step: Step = exec.step.parse()?;

        match step {
            Step::Start => {
                let policy = self.policies.status.clone();
                match self
                    .execute(&mut exec, &policy, self.activities.mark_in_progress(&entity))
                    .await?
                {
                    StepResult::Done(chatbot) => {
                        data.chatbot = Some(chatbot);
                        self.checkpoint(&mut exec, Step::Marked, &data).await?;
                    }
                    StepResult::Backoff => {}
                    StepResult::Failed(message) => {
                        self.begin_failing(&mut exec, &mut data, message).await?
                    }
                }
            }
            Step::Marked => {
                let policy = self.policies.external.clone();
                match self
                    .execute(&mut exec, &policy, self.activities.acquire_content(&entity))
                    .await?
                {
                    StepResult::Done(content) => {
                        data.content = Some(content);
                        self.checkpoint(&mut exec, Step::Acquired, &data).await?;
                    }
                    StepResult::Backoff => {}
                    StepResult::Failed(message) => {
                        self.begin_failing(&mut exec, &mut data, message).await?
                    }
                }
            }
            Step::Acquired => {
                let content = data.content.clone().ok_or_else(|| {
                    Error::Other(format!("Execution {} lost its content snapshot", exec.id))
                })?;
                match content {
                    AcquiredContent::Skipped(reason) => {
                        let policy = self.policies.status.clone();
                        match self
                            .execute(&mut exec, &policy, self.activities.mark_synced(&entity, &reason))
                            .await?
                        {
                            StepResult::Done(()) => {
                                self.finish(&mut exec, ExecState::Completed, None).await?
                            }
                            StepResult::Backoff => {}
                            StepResult::Failed(message) => {
                                self.begin_failing(&mut exec, &mut data, message).await?
                            }
                        }
                    }
                    AcquiredContent::Text(text) => {
                        let chatbot = data.chatbot.clone().ok_or_else(|| {
                            Error::Other(format!(
                                "Execution {} lost its chatbot snapshot",
                                exec.id
                            ))
                        })?;
                        let policy = self.policies.external.clone();
                        match self
                            .execute(
                                &mut exec,
                                &policy,
                                self.activities.index_content(&entity, &chatbot, &text),
                            )
                            .await?
                        {
                            StepResult::Done(count) => {
                                data.indexed_chunks = Some(count);
                                self.checkpoint(&mut exec, Step::Indexed, &data).await?;
                            }
                            StepResult::Backoff => {}
                            StepResult::Failed(message) => {
                                self.begin_failing(&mut exec, &mut data, message).await?
                            }
                        }
                    }
                }
            }
            Step::Indexed => {
                let message = match data.indexed_chunks {
                    Some(count) => format!("Indexed {} chunks", count),
                    None => "Indexed".to_string(),
                };
                let policy = self.policies.status.clone();
                match self
                    .execute(&mut exec, &policy, self.activities.mark_synced(&entity, &message))
                    .await?
                {
                    StepResult::Done(()) => {
                        self.finish(&mut exec, ExecState::Completed, None).await?
                    }
                    StepResult::Backoff => {}
                    StepResult::Failed(message) => {
                        self.begin_failing(&mut exec, &mut data, message).await?
                    }
                }
            }
            Step::Failing => {
                let message = data
                    .failure
                    .clone()
                    .unwrap_or_else(|| "sync failed".to_string());
                let policy = self.policies.status.clone();
                match self
                    .execute(&mut exec, &policy, self.activities.mark_failed(&entity, &message))
                    .await?
                {
                    StepResult::Done(()) => {
                        self.finish(&mut exec, ExecState::Failed, Some(&message)).await?
                    }
                    StepResult::Backoff => {}
                    StepResult::Failed(write_error) => {
                        // The status store kept rejecting the FAILED write;
                        // keep the cause on the execution row and stop.
                        warn!(
                            "Could not record failure for {}: {}",
                            exec.id, write_error
                        );
                        self.finish(&mut exec, ExecState::Failed, Some(&message)).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Run one activity under the step timeout and retry policy
    async fn execute<T>(
        &self,
        exec: &mut ExecutionRow,
        policy: &RetryPolicy,
        activity: impl Future<Output = Result<T>>,
    ) -> Result<StepResult<T>> {
        let timeout = self.policies.step_timeout;
        let outcome = match tokio::time::timeout(timeout, activity).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "Step '{}' of {} exceeded {:?}",
                exec.step, exec.id, timeout
            ))),
        };

        match outcome {
            Ok(value) => Ok(StepResult::Done(value)),
            Err(err) => {
                let failures = exec.attempt as u32 + 1;
                if err.is_retryable() && failures < policy.max_attempts {
                    let delay = policy.backoff(failures);
                    warn!(
                        "{} step '{}' attempt {}/{} failed, retrying in {:?}: {}",
                        exec.id, exec.step, failures, policy.max_attempts, delay, err
                    );
                    self.record_retry(exec, failures, delay, &err.to_string())
                        .await?;
                    Ok(StepResult::Backoff)
                } else {
                    warn!(
                        "{} step '{}' failed terminally after {} attempt(s): {}",
                        exec.id, exec.step, failures, err
                    );
                    Ok(StepResult::Failed(err.to_string()))
                }
            }
        }
    }

    /// Persist a completed step and its accumulated DTOs
    async fn checkpoint(&self, exec: &mut ExecutionRow, step: Step, data: &StepData) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(data)?;

        sqlx::query(
            r#"
            UPDATE sync_executions SET
                step = ?, step_data = ?, attempt = 0, next_attempt_at = NULL,
                last_error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(step.to_string())
        .bind(&json)
        .bind(&now)
        .bind(&exec.id)
        .execute(self.records.pool())
        .await?;

        exec.step = step.to_string();
        exec.step_data = Some(json);
        exec.attempt = 0;
        exec.next_attempt_at = None;
        Ok(())
    }

    /// Route a terminally failed step into the mark-failed path
    async fn begin_failing(
        &self,
        exec: &mut ExecutionRow,
        data: &mut StepData,
        message: String,
    ) -> Result<()> {
        data.failure = Some(message);
        self.checkpoint(exec, Step::Failing, data).await
    }

    /// Persist a failed attempt and its backoff gate
    async fn record_retry(
        &self,
        exec: &mut ExecutionRow,
        failures: u32,
        delay: Duration,
        err: &str,
    ) -> Result<()> {
        let next = rfc3339_after(delay);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE sync_executions SET attempt = ?, next_attempt_at = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(failures as i64)
        .bind(&next)
        .bind(err)
        .bind(&now)
        .bind(&exec.id)
        .execute(self.records.pool())
        .await?;

        exec.attempt = failures as i64;
        exec.next_attempt_at = Some(next);
        exec.last_error = Some(err.to_string());
        Ok(())
    }

    /// Move an execution to a terminal state
    async fn finish(
        &self,
        exec: &mut ExecutionRow,
        state: ExecState,
        last_error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE sync_executions SET state = ?, next_attempt_at = NULL, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(state.to_string())
        .bind(last_error)
        .bind(&now)
        .bind(&exec.id)
        .execute(self.records.pool())
        .await?;

        exec.state = state.to_string();
        info!("Sync execution {} finished as {}", exec.id, state);
        Ok(())
    }

    /// Fail an execution whose persisted state cannot be interpreted
    async fn abandon(&self, key: &str, err: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sync_executions SET state = 'failed', next_attempt_at = NULL, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(err)
        .bind(Utc::now().to_rfc3339())
        .bind(key)
        .execute(self.records.pool())
        .await?;
        Ok(())
    }
}

fn rfc3339_after(delay: Duration) -> String {
    let delta = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
    (Utc::now() + delta).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embed::{Embedder, EmbedderProvider};
    use crate::objectstore::ObjectStore;
    use crate::parse::DocumentParser;
    use crate::store::{IndexPoint, VectorIndex};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NoopObjectStore;

    #[async_trait]
    impl ObjectStore for NoopObjectStore {
        async fn upload(&self, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<()> {
            Ok(())
        }

        fn signed_url(&self, key: &str, _ttl: Duration) -> Result<String> {
            Ok(format!("http://store.test/{}", key))
        }
    }

    struct NoopParser;

    #[async_trait]
    impl DocumentParser for NoopParser {
        async fn parse(&self, _document_url: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct NoopEmbedders;

    impl EmbedderProvider for NoopEmbedders {
        fn embedder_for(
            &self,
            _config: &crate::records::EmbeddingModelConfig,
        ) -> Result<Box<dyn Embedder>> {
            Err(Error::Config("no embedder in this test".to_string()))
        }
    }

    struct NoopIndex;

    #[async_trait]
    impl VectorIndex for NoopIndex {
        async fn ensure_namespace(&self, _namespace: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn replace_document(
            &self,
            _namespace: &str,
            _entity_id: &str,
            _points: Vec<IndexPoint>,
        ) -> Result<()> {
            Ok(())
        }
    }

    async fn test_engine() -> (SyncEngine, RecordStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let records = RecordStore::new(&tmp.path().join("test.db")).await.unwrap();
        let activities = Activities::new(
            records.clone(),
            std::sync::Arc::new(NoopObjectStore),
            std::sync::Arc::new(NoopParser),
            std::sync::Arc::new(NoopEmbedders),
            std::sync::Arc::new(NoopIndex),
            &Config::default(),
        );
        let engine = SyncEngine::new(
            records.clone(),
            activities,
            SyncPolicies::from_config(&Config::default().sync),
        );
        (engine, records, tmp)
    }

    #[tokio::test]
    async fn test_start_is_deduplicated() {
        let (engine, _records, _tmp) = test_engine().await;

        let first = engine.start(EntityKind::Document, "doc-1").await.unwrap();
        let second = engine.start(EntityKind::Document, "doc-1").await.unwrap();

        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::AlreadyRunning);

        // Same entity ID under a different kind is a different execution
        let other = engine.start(EntityKind::Dialogue, "doc-1").await.unwrap();
        assert_eq!(other, StartOutcome::Started);
    }

    #[tokio::test]
    async fn test_terminal_execution_restarts() {
        let (engine, records, _tmp) = test_engine().await;

        engine.start(EntityKind::Document, "doc-1").await.unwrap();
        let key = EntityRef::new(EntityKind::Document, "doc-1").execution_key();

        sqlx::query("UPDATE sync_executions SET state = 'failed', step = 'failing' WHERE id = ?")
            .bind(&key)
            .execute(records.pool())
            .await
            .unwrap();

        let outcome = engine.start(EntityKind::Document, "doc-1").await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);

        let row = engine.get_execution(&key).await.unwrap().unwrap();
        assert_eq!(row.state, "running");
        assert_eq!(row.step, "start");
        assert_eq!(row.attempt, 0);
        assert!(row.step_data.is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_backoff_gate() {
        let (engine, records, _tmp) = test_engine().await;

        engine.start(EntityKind::Document, "doc-1").await.unwrap();
        let key = EntityRef::new(EntityKind::Document, "doc-1").execution_key();

        let far_future = rfc3339_after(Duration::from_secs(3600));
        sqlx::query("UPDATE sync_executions SET next_attempt_at = ? WHERE id = ?")
            .bind(&far_future)
            .bind(&key)
            .execute(records.pool())
            .await
            .unwrap();

        let claimed = engine.claim_batch(10).await.unwrap();
        assert!(claimed.is_empty());

        sqlx::query("UPDATE sync_executions SET next_attempt_at = NULL WHERE id = ?")
            .bind(&key)
            .execute(records.pool())
            .await
            .unwrap();

        let claimed = engine.claim_batch(10).await.unwrap();
        assert_eq!(claimed.len(), 1);

        // Claimed rows are leased and cannot be claimed again
        let reclaimed = engine.claim_batch(10).await.unwrap();
        assert!(reclaimed.is_empty());
    }
}
