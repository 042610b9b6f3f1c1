//! In-process stores for local runs and tests. Both record every call they
//! receive and can be switched into a failing mode.

use anyhow::{Result, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use extract::schema::EntityKey;
use extract::{Entity, RelationType, canonical_name};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::credential::{ReadOnlyCredential, ReadWriteCredential};
use crate::store::{
    GraphRow, GraphStats, GraphStore, ResolvedRelationship, ScoredChunk, VectorRecord, VectorStore,
};

/// Typed endpoints plus relation type, matching a Neo4j edge between two nodes
type EdgeKey = (EntityKey, EntityKey, RelationType);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphCall {
    UpsertEntities(usize),
    WriteRelationships(RelationType, usize),
    Traverse(String),
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    entities: DashMap<EntityKey, Entity>,
    relationships: DashMap<EdgeKey, ResolvedRelationship>,
    calls: Mutex<Vec<GraphCall>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    fn record(&self, call: GraphCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("graph store is closed");
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("graph store unavailable");
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("graph store is closed");
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("graph store unavailable");
        }
        Ok(())
    }
}

impl GraphStore for InMemoryGraphStore {
    fn batch_upsert_entities(
        &self,
        _credential: &ReadWriteCredential,
        entities: &[Entity],
    ) -> Result<()> {
        self.check_writable()?;
        self.record(GraphCall::UpsertEntities(entities.len()));

        for entity in entities {
            let mut slot = self
                .entities
                .entry(entity.key())
                .or_insert_with(|| entity.clone());
            if entity.supersedes(&slot) {
                *slot = entity.clone();
            }
        }
        Ok(())
    }

    fn batch_write_relationships(
        &self,
        _credential: &ReadWriteCredential,
        relation_type: RelationType,
        relationships: &[ResolvedRelationship],
    ) -> Result<()> {
        self.check_writable()?;
        self.record(GraphCall::WriteRelationships(relation_type, relationships.len()));

        for resolved in relationships {
            let relationship = &resolved.relationship;
            let endpoints = [
                (&relationship.source, &resolved.source_type),
                (&relationship.target, &resolved.target_type),
            ];
            for (name, entity_type) in endpoints {
                self.entities
                    .entry((canonical_name(name), entity_type.clone()))
                    .or_insert_with(|| Entity {
                        name: name.clone(),
                        entity_type: entity_type.clone(),
                        description: String::new(),
                    });
            }

            let key = (resolved.source_key(), resolved.target_key(), relationship.relation_type);
            let mut slot = self
                .relationships
                .entry(key)
                .or_insert_with(|| resolved.clone());
            if relationship.supersedes(&slot.relationship) {
                *slot = resolved.clone();
            }
        }
        Ok(())
    }

    /// Cypher is not interpreted: every stored relationship touching an
    /// entity whose name occurs in the query is returned.
    fn traverse(&self, _credential: &ReadOnlyCredential, query: &str) -> Result<Vec<GraphRow>> {
        self.check_readable()?;
        self.record(GraphCall::Traverse(query.to_string()));

        let haystack = query.to_lowercase();
        let mentioned = |name: &str| {
            let key = canonical_name(name);
            !key.is_empty() && haystack.contains(&key)
        };

        let mut rows: Vec<GraphRow> = self
            .relationships
            .iter()
            .filter(|entry| {
                let relationship = &entry.value().relationship;
                mentioned(&relationship.source) || mentioned(&relationship.target)
            })
            .map(|entry| {
                let relationship = &entry.value().relationship;
                let mut row = GraphRow::new();
                row.insert("source".to_string(), relationship.source.clone().into());
                row.insert("relation".to_string(), relationship.relation_type.as_str().into());
                row.insert("target".to_string(), relationship.target.clone().into());
                row.insert("description".to_string(), relationship.description.clone().into());
                row
            })
            .collect();

        // DashMap iteration order is arbitrary
        rows.sort_by(|a, b| {
            let key = |row: &GraphRow| {
                ["source", "relation", "target"]
                    .map(|k| row[k].as_str().unwrap_or_default().to_string())
            };
            key(a).cmp(&key(b))
        });
        Ok(rows)
    }

    fn stats(&self, _credential: &ReadOnlyCredential) -> Result<GraphStats> {
        self.check_readable()?;

        let mut entity_types: BTreeMap<String, usize> = BTreeMap::new();
        for entry in self.entities.iter() {
            *entity_types.entry(entry.value().entity_type.clone()).or_default() += 1;
        }
        let mut relationship_types: BTreeMap<String, usize> = BTreeMap::new();
        for entry in self.relationships.iter() {
            *relationship_types
                .entry(entry.value().relationship.relation_type.as_str().to_string())
                .or_default() += 1;
        }

        Ok(GraphStats {
            total_entities: self.entities.len(),
            total_relationships: self.relationships.len(),
            entity_types,
            relationship_types,
        })
    }

    fn search_entities(
        &self,
        _credential: &ReadOnlyCredential,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        self.check_readable()?;

        let needle = pattern.to_lowercase();
        let mut found: Vec<Entity> = self
            .entities
            .iter()
            .filter(|entry| entry.value().name.to_lowercase().contains(&needle))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        found.truncate(limit);
        Ok(found)
    }

    fn health_check(&self) -> Result<()> {
        self.check_readable()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: DashMap<String, VectorRecord>,
    batches: Mutex<Vec<usize>>,
    fail: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Size of every `add_batch` call so far
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("vector store unavailable");
        }
        Ok(())
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_batch(&self, records: &[VectorRecord]) -> Result<()> {
        self.check()?;
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(records.len());
        for record in records {
            self.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    /// Scores by the share of query terms present in the chunk
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.check()?;

        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(String, ScoredChunk)> = self
            .records
            .iter()
            .filter_map(|entry| {
                let record = entry.value();
                let chunk_terms = terms(&record.text);
                let hits = query_terms.iter().filter(|t| chunk_terms.contains(t)).count();
                (hits > 0).then(|| {
                    let chunk = ScoredChunk {
                        document_id: record.metadata.document_id.clone(),
                        chunk_index: record.metadata.chunk_index,
                        text: record.text.clone(),
                        score: hits as f32 / query_terms.len() as f32,
                    };
                    (record.id.clone(), chunk)
                })
            })
            .collect();

        scored.sort_by(|(id_a, a), (id_b, b)| {
            b.score.total_cmp(&a.score).then_with(|| id_a.cmp(id_b))
        });
        Ok(scored.into_iter().take(k).map(|(_, chunk)| chunk).collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, UNKNOWN_ENTITY_TYPE};
    use extract::Relationship;

    fn rw() -> ReadWriteCredential {
        ReadWriteCredential::new("writer", "pw")
    }

    fn ro() -> ReadOnlyCredential {
        ReadOnlyCredential::new("reader", "pw")
    }

    fn entity(name: &str, entity_type: &str, description: &str) -> Entity {
        Entity {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            description: description.to_string(),
        }
    }

    fn works_at(source: &str, target: &str) -> Relationship {
        Relationship {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: RelationType::WorksAt,
            description: String::new(),
        }
    }

    fn record(document_id: &str, chunk_index: usize, text: &str) -> VectorRecord {
        VectorRecord {
            id: format!("{}-{}", document_id, chunk_index),
            text: text.to_string(),
            metadata: ChunkMetadata {
                document_id: document_id.to_string(),
                filename: "notes.txt".to_string(),
                chunk_index,
                total_chunks: 3,
                timestamp: "2024-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn test_upsert_keeps_longer_description_across_batches() {
        let store = InMemoryGraphStore::new();
        store
            .batch_upsert_entities(&rw(), &[entity("Alice", "PERSON", "an engineer at Acme")])
            .unwrap();
        store
            .batch_upsert_entities(&rw(), &[entity("alice", "PERSON", "engineer")])
            .unwrap();

        let found = store.search_entities(&ro(), "ALI", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "an engineer at Acme");
    }

    #[test]
    fn test_relationship_endpoints_get_placeholders() {
        let store = InMemoryGraphStore::new();
        store.batch_upsert_entities(&rw(), &[entity("Alice", "PERSON", "")]).unwrap();
        let relationship = ResolvedRelationship::new(
            works_at("Alice", "Acme"),
            "PERSON",
            UNKNOWN_ENTITY_TYPE,
        );
        store
            .batch_write_relationships(&rw(), RelationType::WorksAt, &[relationship])
            .unwrap();

        let stats = store.stats(&ro()).unwrap();
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.total_relationships, 1);
        assert_eq!(stats.entity_types["UNKNOWN"], 1);
        assert_eq!(stats.relationship_types["WORKS_AT"], 1);

        let rows = store.traverse(&ro(), "MATCH (e {name: 'Acme'}) RETURN e").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["relation"], "WORKS_AT");
    }

    #[test]
    fn test_endpoint_binds_only_to_its_resolved_type() {
        let store = InMemoryGraphStore::new();
        store
            .batch_upsert_entities(
                &rw(),
                &[entity("Jaguar", "ORGANIZATION", "carmaker"), entity("Jaguar", "ANIMAL", "cat")],
            )
            .unwrap();
        let relationship = ResolvedRelationship::new(
            Relationship {
                source: "Jaguar".to_string(),
                target: "Coventry".to_string(),
                relation_type: RelationType::BasedIn,
                description: String::new(),
            },
            "ORGANIZATION",
            "LOCATION",
        );
        store
            .batch_write_relationships(&rw(), RelationType::BasedIn, &[relationship])
            .unwrap();

        let stats = store.stats(&ro()).unwrap();
        assert_eq!(stats.total_relationships, 1);
        // Only the missing LOCATION endpoint was created
        assert_eq!(stats.total_entities, 3);
        assert_eq!(stats.entity_types["LOCATION"], 1);
        assert!(!stats.entity_types.contains_key(UNKNOWN_ENTITY_TYPE));
    }

    #[test]
    fn test_same_names_under_other_types_are_separate_edges() {
        let store = InMemoryGraphStore::new();
        let edges = [
            ResolvedRelationship::new(works_at("Alice", "Acme"), "PERSON", "ORGANIZATION"),
            ResolvedRelationship::new(works_at("alice", "ACME"), "PERSON", "ORGANIZATION"),
            ResolvedRelationship::unresolved(works_at("Alice", "Acme")),
        ];
        store
            .batch_write_relationships(&rw(), RelationType::WorksAt, &edges)
            .unwrap();

        assert_eq!(store.relationship_count(), 2);
        assert_eq!(store.entity_count(), 4);
    }

    #[test]
    fn test_failure_modes_and_close() {
        let store = InMemoryGraphStore::new();
        store.set_fail_writes(true);
        assert!(store.batch_upsert_entities(&rw(), &[]).is_err());
        assert!(store.health_check().is_ok());

        store.set_fail_reads(true);
        assert!(store.stats(&ro()).is_err());

        let store = InMemoryGraphStore::new();
        store.close().unwrap();
        assert!(store.health_check().is_err());
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_term_overlap() {
        let store = InMemoryVectorStore::new();
        store
            .add_batch(&[
                record("doc", 0, "Alice works at Acme in Berlin."),
                record("doc", 1, "Berlin is a city."),
                record("doc", 2, "Nothing relevant here."),
            ])
            .await
            .unwrap();

        let results = store.similarity_search("Where does Alice work in Berlin?", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[0].source_id(), "doc#0");
        assert!(results[0].score > results[1].score);

        let top = store.similarity_search("Berlin", 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(store.batches(), vec![3]);
    }

    #[tokio::test]
    async fn test_vector_store_failure() {
        let store = InMemoryVectorStore::new();
        store.set_fail(true);
        assert!(store.add_batch(&[record("doc", 0, "text")]).await.is_err());
        assert!(store.similarity_search("text", 5).await.is_err());
        assert!(store.is_empty());
    }
}
