//! Qdrant vector index integration
//!
//! One collection per chatbot: the chatbot ID is the index namespace, and
//! every point carries the owning entity ID so a re-sync can replace an
//! entity's nodes wholesale instead of accumulating duplicates.

mod payload;

pub use payload::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

/// Trait for the vector index sink
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Make sure the namespace exists with the expected dimension
    async fn ensure_namespace(&self, namespace: &str, dimension: usize) -> Result<()>;

    /// Replace all nodes belonging to one entity with the given points
    ///
    /// Overwrite-by-entity is what makes the Index step idempotent: calling
    /// this twice with the same points leaves exactly one node set behind,
    /// and calling it with fewer points than before drops the stale rest.
    async fn replace_document(
        &self,
        namespace: &str,
        entity_id: &str,
        points: Vec<IndexPoint>,
    ) -> Result<()>;
}

/// Qdrant-backed vector index
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to Qdrant
    pub fn new(url: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self { client })
    }

    fn collection_name(namespace: &str) -> String {
        format!("kb_{}", namespace)
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<u64>> {
        let info = self.client.collection_info(collection).await?;
        let size = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|config| match config {
                qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
                qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
            });
        Ok(size)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_namespace(&self, namespace: &str, dimension: usize) -> Result<()> {
        let collection = Self::collection_name(namespace);

        if self.client.collection_exists(&collection).await? {
            if let Some(size) = self.collection_dimension(&collection).await? {
                if size as usize != dimension {
                    // A dimension clash means the chatbot's embedding model
                    // changed under an existing collection; no retry fixes it.
                    return Err(Error::Config(format!(
                        "Collection '{}' has vector size {}, embedding model expects {}",
                        collection, size, dimension
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            collection, dimension
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await?;

        Ok(())
    }

    async fn replace_document(
        &self,
        namespace: &str,
        entity_id: &str,
        points: Vec<IndexPoint>,
    ) -> Result<()> {
        let collection = Self::collection_name(namespace);

        debug!(
            "Replacing {} points for entity {} in {}",
            points.len(),
            entity_id,
            collection
        );

        self.client
            .delete_points(DeletePointsBuilder::new(&collection).points(Filter::must([
                Condition::matches("entity_id", entity_id.to_string()),
            ])))
            .await?;

        if points.is_empty() {
            return Ok(());
        }

        let point_structs: Vec<_> = points.into_iter().map(|p| p.to_point_struct()).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection, point_structs))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_is_namespaced() {
        assert_eq!(
            QdrantIndex::collection_name("0f8f4a9c-1111-2222-3333-444455556666"),
            "kb_0f8f4a9c-1111-2222-3333-444455556666"
        );
    }
}
