//! Workflow activities
//!
//! Each activity is one retryable unit of work. All of them tolerate
//! re-execution: status writes overwrite, content acquisition is
//! read-only, and indexing replaces an entity's nodes wholesale.

use super::{AcquiredContent, ChatbotDto, EntityRef};
use crate::chunk::chunk_markdown;
use crate::config::{ChunkConfig, Config};
use crate::embed::{embed_in_batches, EmbedderProvider};
use crate::error::{Error, Result};
use crate::objectstore::ObjectStore;
use crate::parse::DocumentParser;
use crate::records::{EntityKind, RecordStore, SyncStatus};
use crate::store::{IndexPoint, NodePayload, VectorIndex};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Only PDFs go through the OCR parser; everything else short-circuits.
const SUPPORTED_DOCUMENT_MIME: &str = "application/pdf";

/// Shared activity dependencies, injected once at worker startup
#[derive(Clone)]
pub struct Activities {
    records: RecordStore,
    object_store: Arc<dyn ObjectStore>,
    parser: Arc<dyn DocumentParser>,
    embedders: Arc<dyn EmbedderProvider>,
    index: Arc<dyn VectorIndex>,
    chunk_config: ChunkConfig,
    batch_size: usize,
    signed_url_ttl: Duration,
}

impl Activities {
    pub fn new(
        records: RecordStore,
        object_store: Arc<dyn ObjectStore>,
        parser: Arc<dyn DocumentParser>,
        embedders: Arc<dyn EmbedderProvider>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        Self {
            records,
            object_store,
            parser,
            embedders,
            index,
            chunk_config: config.chunk.clone(),
            batch_size: config.embedding.batch_size,
            signed_url_ttl: Duration::from_secs(config.object_store.signed_url_ttl_secs),
        }
    }

    /// Transition the entity to IN_PROGRESS and snapshot its chatbot
    ///
    /// A missing entity or chatbot is terminal, and so is a settings blob
    /// that fails validation: the chatbot snapshot this returns is the only
    /// configuration later steps see.
    pub async fn mark_in_progress(&self, entity: &EntityRef) -> Result<ChatbotDto> {
        debug!("Marking {} {} in progress", entity.kind, entity.id);

        let chatbot_id = match entity.kind {
            EntityKind::Document => {
                let doc = self
                    .records
                    .get_document(&entity.id)
                    .await?
                    .ok_or_else(|| Error::DocumentNotFound(entity.id.clone()))?;
                doc.chatbot_id
            }
            EntityKind::Dialogue => {
                let dialogue = self
                    .records
                    .get_dialogue(&entity.id)
                    .await?
                    .ok_or_else(|| Error::DialogueNotFound(entity.id.clone()))?;
                dialogue.chatbot_id
            }
        };

        let chatbot = self
            .records
            .get_chatbot(&chatbot_id)
            .await?
            .ok_or_else(|| Error::ChatbotNotFound(chatbot_id.clone()))?;
        let settings = chatbot.settings()?;

        self.set_status(entity, SyncStatus::InProgress, None).await?;

        Ok(ChatbotDto {
            id: chatbot.id,
            name: chatbot.name,
            embedding: settings.embedding,
        })
    }

    /// Acquire the text to index
    ///
    /// Documents go object store → signed URL → OCR; dialogues are inline
    /// and need no external call. Unsupported MIME types return `Skipped`
    /// without touching either adapter.
    pub async fn acquire_content(&self, entity: &EntityRef) -> Result<AcquiredContent> {
        match entity.kind {
            EntityKind::Document => {
                let doc = self
                    .records
                    .get_document(&entity.id)
                    .await?
                    .ok_or_else(|| Error::DocumentNotFound(entity.id.clone()))?;

                if doc.mime_type != SUPPORTED_DOCUMENT_MIME {
                    return Ok(AcquiredContent::Skipped(format!(
                        "Content type '{}' is not supported; only {} documents are indexed",
                        doc.mime_type, SUPPORTED_DOCUMENT_MIME
                    )));
                }

                let url = self
                    .object_store
                    .signed_url(&doc.object_key, self.signed_url_ttl)?;
                let markdown = self.parser.parse(&url).await?;

                debug!(
                    "Acquired {} chars of markdown for document {}",
                    markdown.len(),
                    entity.id
                );
                Ok(AcquiredContent::Text(markdown))
            }
            EntityKind::Dialogue => {
                let dialogue = self
                    .records
                    .get_dialogue(&entity.id)
                    .await?
                    .ok_or_else(|| Error::DialogueNotFound(entity.id.clone()))?;

                let questions = dialogue.questions().join("\n");
                Ok(AcquiredContent::Text(format!(
                    "Questions: {}\n\nAnswer: {}\n",
                    questions, dialogue.answer
                )))
            }
        }
    }

    /// Chunk, embed, and upsert into the chatbot's collection
    ///
    /// Point IDs are derived from the entity ID and chunk index, and the
    /// upsert replaces the entity's previous nodes, so re-running this step
    /// overwrites rather than duplicates.
    pub async fn index_content(
        &self,
        entity: &EntityRef,
        chatbot: &ChatbotDto,
        text: &str,
    ) -> Result<usize> {
        let embedder = self.embedders.embedder_for(&chatbot.embedding)?;
        let chunks = chunk_markdown(text, &self.chunk_config);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(embedder.as_ref(), texts, self.batch_size).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let now = Utc::now().to_rfc3339();
        let points: Vec<IndexPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                id: Uuid::new_v5(
                    &Uuid::NAMESPACE_OID,
                    format!("{}:{}", entity.id, chunk.index).as_bytes(),
                ),
                vector,
                payload: NodePayload {
                    entity_id: entity.id.clone(),
                    entity_kind: entity.kind.to_string(),
                    chatbot_id: chatbot.id.clone(),
                    headings: (!chunk.headings.is_empty()).then(|| chunk.headings.clone()),
                    chunk_index: chunk.index as i32,
                    chunk_hash: chunk.hash.clone(),
                    text: chunk.text.clone(),
                    updated_at: now.clone(),
                },
            })
            .collect();

        self.index
            .ensure_namespace(&chatbot.id, embedder.dimension())
            .await?;
        self.index
            .replace_document(&chatbot.id, &entity.id, points)
            .await?;

        info!(
            "Indexed {} chunks for {} {} into chatbot {}",
            chunks.len(),
            entity.kind,
            entity.id,
            chatbot.id
        );
        Ok(chunks.len())
    }

    /// Transition IN_PROGRESS → SYNCED with an outcome message
    pub async fn mark_synced(&self, entity: &EntityRef, message: &str) -> Result<()> {
        self.set_status(entity, SyncStatus::Synced, Some(message))
            .await
    }

    /// Transition to FAILED, preserving the causing error's text
    pub async fn mark_failed(&self, entity: &EntityRef, message: &str) -> Result<()> {
        self.set_status(entity, SyncStatus::Failed, Some(message))
            .await
    }

    async fn set_status(
        &self,
        entity: &EntityRef,
        status: SyncStatus,
        message: Option<&str>,
    ) -> Result<()> {
        match entity.kind {
            EntityKind::Document => {
                self.records
                    .set_document_status(&entity.id, status, message)
                    .await
            }
            EntityKind::Dialogue => {
                self.records
                    .set_dialogue_status(&entity.id, status, message)
                    .await
            }
        }
    }
}
