use chrono::Utc;
use extract::{KnowledgeGraphFragment, RetryPolicy};
use ingest::{Chunk, Error, Result};
use std::sync::Arc;
use tracing::{error, info};

use crate::credential::ReadWriteCredential;
use crate::merge::DocumentGraph;
use crate::offload::BlockingPool;
use crate::pipeline::IngestionRecord;
use crate::store::{ChunkMetadata, GraphStore, VectorRecord, VectorStore};

pub const DEFAULT_VECTOR_BATCH_SIZE: usize = 100;

/// Merges a document's fragments and persists graph and chunks.
///
/// Graph writes cost one call for all entities plus one call per relation
/// type. Writes are MERGE based, so retrying a partially applied batch is
/// harmless.
pub struct BatchWriter {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    pool: BlockingPool,
    credential: ReadWriteCredential,
    retry: RetryPolicy,
    vector_batch_size: usize,
}

fn write_retry(policy: RetryPolicy) -> RetryPolicy {
    policy.with_predicate(|e| matches!(e, Error::WriteUnavailable(_)))
}

impl BatchWriter {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        pool: BlockingPool,
        credential: ReadWriteCredential,
    ) -> Self {
        Self {
            graph,
            vectors,
            pool,
            credential,
            retry: write_retry(RetryPolicy::default()),
            vector_batch_size: DEFAULT_VECTOR_BATCH_SIZE,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = write_retry(policy);
        self
    }

    pub fn with_vector_batch_size(mut self, size: usize) -> Self {
        self.vector_batch_size = size.max(1);
        self
    }

    pub async fn write(
        &self,
        document_id: &str,
        filename: &str,
        chunks: &[Chunk],
        fragments: Vec<KnowledgeGraphFragment>,
    ) -> Result<IngestionRecord> {
        let graph = DocumentGraph::merge(fragments);
        if !graph.has_entities() {
            return Err(Error::Validation(format!(
                "no entities extracted from '{}'",
                filename
            )));
        }

        self.write_graph(&graph).await?;
        let timestamp = Utc::now();
        self.write_chunks(document_id, filename, chunks, &timestamp.to_rfc3339())
            .await?;

        info!(
            document_id,
            filename,
            entities = graph.entities.len(),
            relationships = graph.relationships.len(),
            chunks = chunks.len(),
            "Document written"
        );

        Ok(IngestionRecord {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            timestamp,
            chunk_count: chunks.len(),
            entity_count: graph.entities.len(),
            relationship_count: graph.relationships.len(),
            failed_chunks: 0,
        })
    }

    async fn write_graph(&self, graph: &DocumentGraph) -> Result<()> {
        let entities = Arc::new(graph.entities.clone());
        self.retry
            .run("upsert_entities", || {
                let store = self.graph.clone();
                let credential = self.credential.clone();
                let entities = entities.clone();
                async move {
                    self.pool
                        .run(move || store.batch_upsert_entities(&credential, &entities))
                        .await
                        .map_err(unavailable)
                }
            })
            .await?;

        for (relation_type, relationships) in graph.relationships_by_type() {
            let relationships = Arc::new(relationships);
            self.retry
                .run("write_relationships", || {
                    let store = self.graph.clone();
                    let credential = self.credential.clone();
                    let relationships = relationships.clone();
                    async move {
                        self.pool
                            .run(move || {
                                store.batch_write_relationships(
                                    &credential,
                                    relation_type,
                                    &relationships,
                                )
                            })
                            .await
                            .map_err(unavailable)
                    }
                })
                .await?;
        }

        Ok(())
    }

    async fn write_chunks(
        &self,
        document_id: &str,
        filename: &str,
        chunks: &[Chunk],
        timestamp: &str,
    ) -> Result<()> {
        let records: Vec<VectorRecord> = chunks
            .iter()
            .map(|chunk| VectorRecord {
                id: chunk.point_id(document_id),
                text: chunk.text.clone(),
                metadata: ChunkMetadata {
                    document_id: document_id.to_string(),
                    filename: filename.to_string(),
                    chunk_index: chunk.index,
                    total_chunks: chunks.len(),
                    timestamp: timestamp.to_string(),
                },
            })
            .collect();

        for batch in records.chunks(self.vector_batch_size) {
            self.retry
                .run("add_vectors", || async {
                    self.vectors.add_batch(batch).await.map_err(unavailable)
                })
                .await?;
        }

        Ok(())
    }
}

fn unavailable(e: anyhow::Error) -> Error {
    error!(error = %e, "Store write failed");
    Error::WriteUnavailable(format!("{:#}", e))
}

/// Short waits for tests that exercise retries
#[cfg(test)]
pub(crate) fn fast_retry() -> RetryPolicy {
    use std::time::Duration;
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{GraphCall, InMemoryGraphStore, InMemoryVectorStore};
    use extract::{Entity, RelationType, Relationship};

    fn writer(graph: Arc<InMemoryGraphStore>, vectors: Arc<InMemoryVectorStore>) -> BatchWriter {
        let credential = ReadWriteCredential::new("writer", "pw");
        BatchWriter::new(graph, vectors, BlockingPool::new(2), credential).with_retry(fast_retry())
    }

    fn entity(i: usize) -> Entity {
        Entity {
            name: format!("Entity {}", i),
            entity_type: "CONCEPT".to_string(),
            description: String::new(),
        }
    }

    fn relationship(i: usize, relation_type: RelationType) -> Relationship {
        Relationship {
            source: format!("Entity {}", i),
            target: format!("Entity {}", i + 1),
            relation_type,
            description: String::new(),
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| Chunk::new(i, format!("chunk number {}", i), i * 20)).collect()
    }

    #[tokio::test]
    async fn test_graph_calls_are_one_plus_relation_types() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());

        let types = [RelationType::WorksAt, RelationType::PartOf, RelationType::Owns];
        let relationships = (0..300).map(|i| relationship(i, types[i % 3])).collect();
        let fragment = KnowledgeGraphFragment::new((0..500).map(entity).collect(), relationships);

        let record = writer(graph.clone(), vectors.clone())
            .write("doc-1", "big.txt", &chunks(3), vec![fragment])
            .await
            .unwrap();

        let calls = graph.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], GraphCall::UpsertEntities(500));
        assert!(calls[1..].iter().all(|c| matches!(c, GraphCall::WriteRelationships(_, 100))));

        assert_eq!(record.entity_count, 500);
        assert_eq!(record.relationship_count, 300);

        // Endpoints land on the extracted CONCEPT nodes, not on placeholders
        assert_eq!(graph.entity_count(), 500);
        assert_eq!(graph.relationship_count(), 300);
        assert_eq!(record.chunk_count, 3);
    }

    #[tokio::test]
    async fn test_vectors_written_in_fixed_batches() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let fragment = KnowledgeGraphFragment::new(vec![entity(0)], vec![]);

        writer(graph, vectors.clone())
            .write("doc-1", "long.md", &chunks(250), vec![fragment])
            .await
            .unwrap();

        assert_eq!(vectors.batches(), vec![100, 100, 50]);
        assert_eq!(vectors.len(), 250);
    }

    #[tokio::test]
    async fn test_no_entities_rejects_document_without_writing() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());

        let result = writer(graph.clone(), vectors.clone())
            .write("doc-1", "empty.txt", &chunks(2), vec![KnowledgeGraphFragment::default()])
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(graph.calls().is_empty());
        assert!(vectors.batches().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_write_unavailable() {
        let graph = Arc::new(InMemoryGraphStore::new());
        graph.set_fail_writes(true);
        let vectors = Arc::new(InMemoryVectorStore::new());
        let fragment = KnowledgeGraphFragment::new(vec![entity(0)], vec![]);

        let result = writer(graph, vectors.clone())
            .write("doc-1", "notes.txt", &chunks(1), vec![fragment])
            .await;

        assert!(matches!(result, Err(Error::WriteUnavailable(_))));
        assert!(vectors.is_empty());
    }
}
