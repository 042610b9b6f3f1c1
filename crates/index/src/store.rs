//! Capabilities the pipeline and retriever need from the stores.

use anyhow::Result;
use async_trait::async_trait;
use extract::schema::EntityKey;
use extract::{Entity, RelationType, Relationship, canonical_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::credential::{ReadOnlyCredential, ReadWriteCredential};

/// One result row of a graph traversal, column name to value
pub type GraphRow = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
}

/// Type given to relationship endpoints never extracted as entities
pub const UNKNOWN_ENTITY_TYPE: &str = "UNKNOWN";

/// A relationship whose endpoints are pinned to the same `(key, type)`
/// node identity entities are upserted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelationship {
    pub relationship: Relationship,
    pub source_type: String,
    pub target_type: String,
}

impl ResolvedRelationship {
    pub fn new(
        relationship: Relationship,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            relationship,
            source_type: source_type.into(),
            target_type: target_type.into(),
        }
    }

    /// Both endpoints as placeholders
    pub fn unresolved(relationship: Relationship) -> Self {
        Self::new(relationship, UNKNOWN_ENTITY_TYPE, UNKNOWN_ENTITY_TYPE)
    }

    pub fn source_key(&self) -> EntityKey {
        (canonical_name(&self.relationship.source), self.source_type.clone())
    }

    pub fn target_key(&self) -> EntityKey {
        (canonical_name(&self.relationship.target), self.target_type.clone())
    }
}

/// Graph database access. Every method blocks the calling thread; callers
/// on the async runtime go through [`crate::BlockingPool`].
pub trait GraphStore: Send + Sync {
    /// Upsert all entities in a single round trip
    fn batch_upsert_entities(
        &self,
        credential: &ReadWriteCredential,
        entities: &[Entity],
    ) -> Result<()>;

    /// Write every relationship of one type in a single round trip.
    /// Endpoints missing from the graph are created under their resolved type.
    fn batch_write_relationships(
        &self,
        credential: &ReadWriteCredential,
        relation_type: RelationType,
        relationships: &[ResolvedRelationship],
    ) -> Result<()>;

    /// Run a read-only traversal
    fn traverse(&self, credential: &ReadOnlyCredential, query: &str) -> Result<Vec<GraphRow>>;

    fn stats(&self, credential: &ReadOnlyCredential) -> Result<GraphStats>;

    /// Case-insensitive substring match on entity names
    fn search_entities(
        &self,
        credential: &ReadOnlyCredential,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<Entity>>;

    fn health_check(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub filename: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

impl ScoredChunk {
    /// `document_id#chunk_index`
    pub fn source_id(&self) -> String {
        format!("{}#{}", self.document_id, self.chunk_index)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_batch(&self, records: &[VectorRecord]) -> Result<()>;

    /// Up to `k` chunks, best match first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    async fn health_check(&self) -> Result<()>;
}
