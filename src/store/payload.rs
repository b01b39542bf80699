//! Payload schema for index points

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A point ready to be upserted into a chatbot's collection
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: NodePayload,
}

impl IndexPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each index node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePayload {
    /// Owning entity ID (document or dialogue row)
    pub entity_id: String,

    /// Entity kind ("document", "dialogue")
    pub entity_kind: String,

    /// Owning chatbot ID
    pub chatbot_id: String,

    /// Heading breadcrumb above this chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headings: Option<Vec<String>>,

    /// Chunk index within the entity
    pub chunk_index: i32,

    /// Hash of the chunk content
    pub chunk_hash: String,

    /// The chunk text served back at retrieval time
    pub text: String,

    /// When this node was last written
    pub updated_at: String,
}

impl NodePayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("entity_id".to_string(), string_to_qdrant(&self.entity_id));
        map.insert(
            "entity_kind".to_string(),
            string_to_qdrant(&self.entity_kind),
        );
        map.insert("chatbot_id".to_string(), string_to_qdrant(&self.chatbot_id));
        map.insert(
            "chunk_index".to_string(),
            int_to_qdrant(self.chunk_index as i64),
        );
        map.insert("chunk_hash".to_string(), string_to_qdrant(&self.chunk_hash));
        map.insert("text".to_string(), string_to_qdrant(&self.text));
        map.insert("updated_at".to_string(), string_to_qdrant(&self.updated_at));

        if let Some(ref headings) = self.headings {
            let values: Vec<QdrantValue> = headings.iter().map(|s| string_to_qdrant(s)).collect();
            map.insert(
                "headings".to_string(),
                QdrantValue {
                    kind: Some(qdrant_client::qdrant::value::Kind::ListValue(
                        qdrant_client::qdrant::ListValue { values },
                    )),
                },
            );
        }

        map
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}
