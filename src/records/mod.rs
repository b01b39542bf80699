//! Source-of-truth record storage using SQLite
//!
//! This module owns the rows being synchronized:
//! - Chatbots (tenant + embedding settings)
//! - Documents (uploaded files referenced by object key)
//! - Dialogues (authored question/answer pairs)
//!
//! The vector index is a derived projection of these rows; whatever the
//! index says, these records win, and a re-sync rebuilds the projection.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Synchronization status of a document or dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    NotSynced,
    InProgress,
    Synced,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::NotSynced => write!(f, "NOT_SYNCED"),
            SyncStatus::InProgress => write!(f, "IN_PROGRESS"),
            SyncStatus::Synced => write!(f, "SYNCED"),
            SyncStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NOT_SYNCED" => Ok(SyncStatus::NotSynced),
            "IN_PROGRESS" => Ok(SyncStatus::InProgress),
            "SYNCED" => Ok(SyncStatus::Synced),
            "FAILED" => Ok(SyncStatus::Failed),
            _ => Err(Error::Other(format!("Unknown sync status: {}", s))),
        }
    }
}

/// Kinds of syncable entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Document,
    Dialogue,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Document => write!(f, "document"),
            EntityKind::Dialogue => write!(f, "dialogue"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "document" => Ok(EntityKind::Document),
            "dialogue" => Ok(EntityKind::Dialogue),
            _ => Err(Error::Other(format!("Unknown entity kind: {}", s))),
        }
    }
}

/// Embedding model selection stored in chatbot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

/// Validated chatbot settings
///
/// Settings arrive as free-form JSON from the management surface; this is
/// the single place they are checked. Unknown provider/model combinations
/// are rejected here so the workflow fails fast on a configuration error
/// instead of deep inside an indexing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatbotSettings {
    pub embedding: EmbeddingModelConfig,
}

impl ChatbotSettings {
    /// Parse and validate a settings JSON blob
    pub fn parse(json: &str) -> Result<Self> {
        let settings: ChatbotSettings = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid chatbot settings: {}", e)))?;

        let em = &settings.embedding;
        let expected = crate::embed::registered_dimension(&em.provider, &em.model).ok_or_else(
            || {
                Error::Config(format!(
                    "Unknown embedding model '{}/{}'",
                    em.provider, em.model
                ))
            },
        )?;
        if expected != em.dimensions {
            return Err(Error::Config(format!(
                "Embedding model '{}/{}' has dimension {}, settings say {}",
                em.provider, em.model, expected, em.dimensions
            )));
        }

        Ok(settings)
    }
}

/// A chatbot row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chatbot {
    pub id: String,
    pub name: String,
    pub settings_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Chatbot {
    pub fn new(name: String, settings: &ChatbotSettings) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            settings_json: serde_json::to_string(settings)?,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Validated settings for this chatbot
    pub fn settings(&self) -> Result<ChatbotSettings> {
        ChatbotSettings::parse(&self.settings_json)
    }
}

/// A document row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub chatbot_id: String,
    pub title: String,
    pub object_key: String,
    pub mime_type: String,
    pub sync_status: String,
    pub sync_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(chatbot_id: String, title: String, object_key: String, mime_type: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            chatbot_id,
            title,
            object_key,
            mime_type,
            sync_status: SyncStatus::NotSynced.to_string(),
            sync_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> Result<SyncStatus> {
        self.sync_status.parse()
    }
}

/// A dialogue row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dialogue {
    pub id: String,
    pub chatbot_id: String,
    pub name: String,
    pub questions_json: String,
    pub answer: String,
    pub sync_status: String,
    pub sync_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Dialogue {
    pub fn new(
        chatbot_id: String,
        name: String,
        questions: &[String],
        answer: String,
    ) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            chatbot_id,
            name,
            questions_json: serde_json::to_string(questions)?,
            answer,
            sync_status: SyncStatus::NotSynced.to_string(),
            sync_message: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn status(&self) -> Result<SyncStatus> {
        self.sync_status.parse()
    }

    pub fn questions(&self) -> Vec<String> {
        serde_json::from_str(&self.questions_json).unwrap_or_default()
    }
}

/// An entity waiting for synchronization
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PendingEntity {
    pub kind: String,
    pub id: String,
    pub chatbot_id: String,
    pub updated_at: String,
}

impl PendingEntity {
    pub fn entity_kind(&self) -> Result<EntityKind> {
        self.kind.parse()
    }
}

/// Per-status row counts for one entity table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub not_synced: i64,
    pub in_progress: i64,
    pub synced: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.not_synced + self.in_progress + self.synced + self.failed
    }
}

/// Records database handle
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Connect to the records database using config paths
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Connect with a database path directly
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };

        if !store.is_initialized().await? {
            store.init_schema().await?;
        }

        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='chatbots'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ===== Chatbot Operations =====

    /// Insert a new chatbot
    pub async fn insert_chatbot(&self, chatbot: &Chatbot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chatbots (id, name, settings_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chatbot.id)
        .bind(&chatbot.name)
        .bind(&chatbot.settings_json)
        .bind(&chatbot.created_at)
        .bind(&chatbot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get chatbot by ID
    pub async fn get_chatbot(&self, id: &str) -> Result<Option<Chatbot>> {
        let chatbot = sqlx::query_as::<_, Chatbot>("SELECT * FROM chatbots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chatbot)
    }

    // ===== Document Operations =====

    /// Insert a new document record
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, chatbot_id, title, object_key, mime_type,
                                   sync_status, sync_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.chatbot_id)
        .bind(&doc.title)
        .bind(&doc.object_key)
        .bind(&doc.mime_type)
        .bind(&doc.sync_status)
        .bind(&doc.sync_message)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Replace a document's content fields and make it eligible for re-sync
    pub async fn update_document(
        &self,
        id: &str,
        title: &str,
        object_key: &str,
        mime_type: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                title = ?,
                object_key = ?,
                mime_type = ?,
                sync_status = ?,
                sync_message = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(object_key)
        .bind(mime_type)
        .bind(SyncStatus::NotSynced.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Atomically set a document's sync status, overwriting the message
    pub async fn set_document_status(
        &self,
        id: &str,
        status: SyncStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET sync_status = ?, sync_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    // ===== Dialogue Operations =====

    /// Insert a new dialogue record
    pub async fn insert_dialogue(&self, dialogue: &Dialogue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dialogues (id, chatbot_id, name, questions_json, answer,
                                   sync_status, sync_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&dialogue.id)
        .bind(&dialogue.chatbot_id)
        .bind(&dialogue.name)
        .bind(&dialogue.questions_json)
        .bind(&dialogue.answer)
        .bind(&dialogue.sync_status)
        .bind(&dialogue.sync_message)
        .bind(&dialogue.created_at)
        .bind(&dialogue.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get dialogue by ID
    pub async fn get_dialogue(&self, id: &str) -> Result<Option<Dialogue>> {
        let dialogue = sqlx::query_as::<_, Dialogue>("SELECT * FROM dialogues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dialogue)
    }

    /// Replace a dialogue's content and make it eligible for re-sync
    pub async fn update_dialogue(
        &self,
        id: &str,
        name: &str,
        questions: &[String],
        answer: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE dialogues SET
                name = ?,
                questions_json = ?,
                answer = ?,
                sync_status = ?,
                sync_message = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(serde_json::to_string(questions)?)
        .bind(answer)
        .bind(SyncStatus::NotSynced.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DialogueNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Atomically set a dialogue's sync status, overwriting the message
    pub async fn set_dialogue_status(
        &self,
        id: &str,
        status: SyncStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dialogues SET sync_status = ?, sync_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DialogueNotFound(id.to_string()));
        }
        Ok(())
    }

    // ===== Scan Support =====

    /// Entities waiting for a sync run, oldest first
    ///
    /// IN_PROGRESS rows are excluded: they are claimed by an in-flight
    /// workflow, and the execution key dedup closes the remaining window
    /// between a status write and the next scan tick.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<PendingEntity>> {
        let pending = sqlx::query_as::<_, PendingEntity>(
            r#"
            SELECT 'document' AS kind, id, chatbot_id, updated_at
            FROM documents WHERE sync_status IN (?, ?)
            UNION ALL
            SELECT 'dialogue' AS kind, id, chatbot_id, updated_at
            FROM dialogues WHERE sync_status IN (?, ?)
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(SyncStatus::NotSynced.to_string())
        .bind(SyncStatus::Failed.to_string())
        .bind(SyncStatus::NotSynced.to_string())
        .bind(SyncStatus::Failed.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(pending)
    }

    // ===== Statistics =====

    /// Number of registered chatbots
    pub async fn chatbot_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chatbots")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Per-status counts for one entity table
    pub async fn status_counts(&self, kind: EntityKind) -> Result<StatusCounts> {
        let table = match kind {
            EntityKind::Document => "documents",
            EntityKind::Dialogue => "dialogues",
        };
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status",
            table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<SyncStatus>()? {
                SyncStatus::NotSynced => counts.not_synced = count,
                SyncStatus::InProgress => counts.in_progress = count,
                SyncStatus::Synced => counts.synced = count,
                SyncStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_settings() -> ChatbotSettings {
        ChatbotSettings {
            embedding: EmbeddingModelConfig {
                provider: "openai".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimensions: 1536,
            },
        }
    }

    async fn setup_test_db() -> (RecordStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::new(&tmp.path().join("test.db")).await.unwrap();
        (store, tmp)
    }

    async fn seed_chatbot(store: &RecordStore) -> Chatbot {
        let chatbot = Chatbot::new("Support Bot".to_string(), &test_settings()).unwrap();
        store.insert_chatbot(&chatbot).await.unwrap();
        chatbot
    }

    #[test]
    fn test_sync_status_round_trip() {
        for status in [
            SyncStatus::NotSynced,
            SyncStatus::InProgress,
            SyncStatus::Synced,
            SyncStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_settings_validation() {
        let good = serde_json::to_string(&test_settings()).unwrap();
        assert!(ChatbotSettings::parse(&good).is_ok());

        let unknown_model = r#"{"embedding":{"provider":"openai","model":"no-such-model","dimensions":42}}"#;
        assert!(matches!(
            ChatbotSettings::parse(unknown_model),
            Err(Error::Config(_))
        ));

        let wrong_dims = r#"{"embedding":{"provider":"openai","model":"text-embedding-3-small","dimensions":7}}"#;
        assert!(matches!(
            ChatbotSettings::parse(wrong_dims),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_document_status_updates() {
        let (store, _tmp) = setup_test_db().await;
        let chatbot = seed_chatbot(&store).await;

        let doc = Document::new(
            chatbot.id.clone(),
            "Handbook".to_string(),
            "uploads/handbook.pdf".to_string(),
            "application/pdf".to_string(),
        );
        store.insert_document(&doc).await.unwrap();

        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status().unwrap(), SyncStatus::NotSynced);

        store
            .set_document_status(&doc.id, SyncStatus::InProgress, None)
            .await
            .unwrap();
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status().unwrap(), SyncStatus::InProgress);
        assert_eq!(loaded.sync_message, None);

        store
            .set_document_status(&doc.id, SyncStatus::Failed, Some("parse failed"))
            .await
            .unwrap();
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.sync_message.as_deref(), Some("parse failed"));

        // Message is overwritten, not appended
        store
            .set_document_status(&doc.id, SyncStatus::Synced, Some("indexed 3 chunks"))
            .await
            .unwrap();
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.sync_message.as_deref(), Some("indexed 3 chunks"));
    }

    #[tokio::test]
    async fn test_set_status_missing_row() {
        let (store, _tmp) = setup_test_db().await;
        let err = store
            .set_document_status("nope", SyncStatus::Synced, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_pending_excludes_in_progress_includes_failed() {
        let (store, _tmp) = setup_test_db().await;
        let chatbot = seed_chatbot(&store).await;

        let fresh = Document::new(
            chatbot.id.clone(),
            "a".to_string(),
            "k/a.pdf".to_string(),
            "application/pdf".to_string(),
        );
        let claimed = Document::new(
            chatbot.id.clone(),
            "b".to_string(),
            "k/b.pdf".to_string(),
            "application/pdf".to_string(),
        );
        let failed = Dialogue::new(
            chatbot.id.clone(),
            "greeting".to_string(),
            &["hi".to_string()],
            "hello".to_string(),
        )
        .unwrap();
        store.insert_document(&fresh).await.unwrap();
        store.insert_document(&claimed).await.unwrap();
        store.insert_dialogue(&failed).await.unwrap();

        store
            .set_document_status(&claimed.id, SyncStatus::InProgress, None)
            .await
            .unwrap();
        store
            .set_dialogue_status(&failed.id, SyncStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let pending = store.list_pending(10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&fresh.id.as_str()));
        assert!(ids.contains(&failed.id.as_str()));
        assert!(!ids.contains(&claimed.id.as_str()));
    }

    #[tokio::test]
    async fn test_dialogue_edit_resets_sync() {
        let (store, _tmp) = setup_test_db().await;
        let chatbot = seed_chatbot(&store).await;

        let dialogue = Dialogue::new(
            chatbot.id.clone(),
            "refunds".to_string(),
            &["how do I get a refund?".to_string()],
            "Open a support ticket.".to_string(),
        )
        .unwrap();
        store.insert_dialogue(&dialogue).await.unwrap();

        for prior in [SyncStatus::Synced, SyncStatus::Failed] {
            store
                .set_dialogue_status(&dialogue.id, prior, Some("old message"))
                .await
                .unwrap();

            store
                .update_dialogue(
                    &dialogue.id,
                    "refunds",
                    &["how do I get my money back?".to_string()],
                    "Open a support ticket within 30 days.",
                )
                .await
                .unwrap();

            let loaded = store.get_dialogue(&dialogue.id).await.unwrap().unwrap();
            assert_eq!(loaded.status().unwrap(), SyncStatus::NotSynced);
            assert_eq!(loaded.sync_message, None);
            assert_eq!(loaded.questions(), vec!["how do I get my money back?"]);
        }
    }

    #[tokio::test]
    async fn test_status_counts() {
        let (store, _tmp) = setup_test_db().await;
        let chatbot = seed_chatbot(&store).await;

        for i in 0..3 {
            let doc = Document::new(
                chatbot.id.clone(),
                format!("doc {}", i),
                format!("k/{}.pdf", i),
                "application/pdf".to_string(),
            );
            store.insert_document(&doc).await.unwrap();
            if i == 0 {
                store
                    .set_document_status(&doc.id, SyncStatus::Synced, None)
                    .await
                    .unwrap();
            }
        }

        let counts = store.status_counts(EntityKind::Document).await.unwrap();
        assert_eq!(counts.synced, 1);
        assert_eq!(counts.not_synced, 2);
        assert_eq!(counts.total(), 3);
    }
}
