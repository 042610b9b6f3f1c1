use anyhow::{Context, Result};
use extract::{Entity, RelationType, canonical_name};
use neo4rs::{BoltMap, BoltString, BoltType, Graph, Query};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::info;

use crate::credential::{ReadOnlyCredential, ReadWriteCredential};
use crate::store::{GraphRow, GraphStats, GraphStore, ResolvedRelationship};

/// Neo4j with one connection per credential.
///
/// The [`GraphStore`] methods block on the runtime captured at `open`, so
/// they must run on a blocking thread ([`crate::BlockingPool`]).
pub struct Neo4jGraphStore {
    rw: Graph,
    ro: Graph,
    rw_user: String,
    ro_user: String,
    runtime: Handle,
    closed: AtomicBool,
}

const UPSERT_ENTITIES: &str = r#"
    UNWIND $entities AS entity
    MERGE (e:Entity {key: entity.key, type: entity.type})
    ON CREATE SET e.name = entity.name, e.description = entity.description
    ON MATCH SET e.description = CASE
        WHEN size(entity.description) > size(coalesce(e.description, ''))
        THEN entity.description ELSE e.description END
    SET e.last_updated = datetime()
"#;

const STATS_ENTITY_COUNT: &str = "MATCH (e:Entity) RETURN count(e) AS count";
const STATS_RELATIONSHIP_COUNT: &str = "MATCH (:Entity)-[r]->(:Entity) RETURN count(r) AS count";
const STATS_ENTITY_TYPES: &str =
    "MATCH (e:Entity) RETURN e.type AS type, count(e) AS count ORDER BY count DESC";
const STATS_RELATIONSHIP_TYPES: &str =
    "MATCH (:Entity)-[r]->(:Entity) RETURN type(r) AS type, count(r) AS count ORDER BY count DESC";

const SEARCH_ENTITIES: &str = r#"
    MATCH (e:Entity)
    WHERE toLower(e.name) CONTAINS toLower($pattern)
    RETURN e.name AS name, e.type AS type, e.description AS description
    ORDER BY e.name
    LIMIT $limit
"#;

/// Relationship types can't be parameters, so the label is spliced in.
/// It only ever comes from the closed vocabulary. Endpoints merge on the
/// same `{key, type}` identity as [`UPSERT_ENTITIES`].
fn write_relationships_query(relation_type: RelationType) -> String {
    format!(
        r#"
    UNWIND $relationships AS rel
    MERGE (source:Entity {{key: rel.source_key, type: rel.source_type}})
    ON CREATE SET source.name = rel.source, source.description = ''
    MERGE (target:Entity {{key: rel.target_key, type: rel.target_type}})
    ON CREATE SET target.name = rel.target, target.description = ''
    MERGE (source)-[r:{}]->(target)
    ON CREATE SET r.description = rel.description
    ON MATCH SET r.description = CASE
        WHEN size(rel.description) > size(coalesce(r.description, ''))
        THEN rel.description ELSE r.description END
    SET r.last_updated = datetime()
"#,
        relation_type.as_str()
    )
}

fn bolt_map(fields: &[(&str, &str)]) -> BoltType {
    let mut map = BoltMap::new();
    for (key, value) in fields {
        map.put(BoltString::from(*key), BoltType::from(*value));
    }
    BoltType::Map(map)
}

fn entity_params(entities: &[Entity]) -> Vec<BoltType> {
    entities
        .iter()
        .map(|entity| {
            let key = canonical_name(&entity.name);
            bolt_map(&[
                ("key", key.as_str()),
                ("name", entity.name.as_str()),
                ("type", entity.entity_type.as_str()),
                ("description", entity.description.as_str()),
            ])
        })
        .collect()
}

fn relationship_params(relationships: &[ResolvedRelationship]) -> Vec<BoltType> {
    relationships
        .iter()
        .map(|resolved| {
            let rel = &resolved.relationship;
            let source_key = canonical_name(&rel.source);
            let target_key = canonical_name(&rel.target);
            bolt_map(&[
                ("source_key", source_key.as_str()),
                ("source_type", resolved.source_type.as_str()),
                ("source", rel.source.as_str()),
                ("target_key", target_key.as_str()),
                ("target_type", resolved.target_type.as_str()),
                ("target", rel.target.as_str()),
                ("description", rel.description.as_str()),
            ])
        })
        .collect()
}

impl Neo4jGraphStore {
    /// Connect with both credentials. Must be called from within the runtime.
    pub async fn open(
        uri: &str,
        rw: &ReadWriteCredential,
        ro: &ReadOnlyCredential,
    ) -> Result<Self> {
        let rw_graph = Graph::new(uri, rw.user(), rw.password())
            .await
            .context("Failed to connect to Neo4j with read-write credential")?;
        let ro_graph = Graph::new(uri, ro.user(), ro.password())
            .await
            .context("Failed to connect to Neo4j with read-only credential")?;

        info!(uri, rw_user = rw.user(), ro_user = ro.user(), "Connected to Neo4j");

        Ok(Self {
            rw: rw_graph,
            ro: ro_graph,
            rw_user: rw.user().to_string(),
            ro_user: ro.user().to_string(),
            runtime: Handle::current(),
            closed: AtomicBool::new(false),
        })
    }

    /// Create indexes used by the upsert and search queries
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE INDEX entity_key_index IF NOT EXISTS FOR (e:Entity) ON (e.key)",
            "CREATE INDEX entity_name_index IF NOT EXISTS FOR (e:Entity) ON (e.name)",
            "CREATE INDEX entity_type_index IF NOT EXISTS FOR (e:Entity) ON (e.type)",
        ];
        for statement in statements {
            self.rw
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to run schema statement: {}", statement))?;
        }

        info!("Neo4j indexes created");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("Neo4j store is closed");
        }
        Ok(())
    }

    fn writer(&self, credential: &ReadWriteCredential) -> Result<&Graph> {
        self.ensure_open()?;
        if credential.user() != self.rw_user {
            anyhow::bail!("Credential for '{}' was not opened on this store", credential.user());
        }
        Ok(&self.rw)
    }

    fn reader(&self, credential: &ReadOnlyCredential) -> Result<&Graph> {
        self.ensure_open()?;
        if credential.user() != self.ro_user {
            anyhow::bail!("Credential for '{}' was not opened on this store", credential.user());
        }
        Ok(&self.ro)
    }

    fn fetch_rows(&self, graph: &Graph, query: Query) -> Result<Vec<GraphRow>> {
        self.runtime.block_on(async {
            let mut result = graph.execute(query).await.context("Neo4j query failed")?;
            let mut rows = Vec::new();
            while let Some(row) = result.next().await? {
                let row: GraphRow = row.to().context("Failed to decode Neo4j row")?;
                rows.push(row);
            }
            Ok(rows)
        })
    }

    fn fetch_count(&self, graph: &Graph, statement: &str) -> Result<usize> {
        let rows = self.fetch_rows(graph, Query::new(statement.to_string()))?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize)
    }

    fn fetch_histogram(&self, graph: &Graph, statement: &str) -> Result<BTreeMap<String, usize>> {
        let rows = self.fetch_rows(graph, Query::new(statement.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let label = row.get("type")?.as_str()?.to_string();
                let count = row.get("count")?.as_u64()? as usize;
                Some((label, count))
            })
            .collect())
    }
}

impl GraphStore for Neo4jGraphStore {
    fn batch_upsert_entities(
        &self,
        credential: &ReadWriteCredential,
        entities: &[Entity],
    ) -> Result<()> {
        let graph = self.writer(credential)?;
        if entities.is_empty() {
            return Ok(());
        }

        let query =
            Query::new(UPSERT_ENTITIES.to_string()).param("entities", entity_params(entities));
        self.runtime
            .block_on(graph.run(query))
            .context("Failed to upsert entities")?;

        info!(count = entities.len(), "Upserted entities");
        Ok(())
    }

    fn batch_write_relationships(
        &self,
        credential: &ReadWriteCredential,
        relation_type: RelationType,
        relationships: &[ResolvedRelationship],
    ) -> Result<()> {
        let graph = self.writer(credential)?;
        if relationships.is_empty() {
            return Ok(());
        }

        let query = Query::new(write_relationships_query(relation_type))
            .param("relationships", relationship_params(relationships));
        self.runtime
            .block_on(graph.run(query))
            .with_context(|| format!("Failed to write {} relationships", relation_type))?;

        info!(relation_type = %relation_type, count = relationships.len(), "Wrote relationships");
        Ok(())
    }

    fn traverse(&self, credential: &ReadOnlyCredential, query: &str) -> Result<Vec<GraphRow>> {
        let graph = self.reader(credential)?;
        self.fetch_rows(graph, Query::new(query.to_string()))
    }

    fn stats(&self, credential: &ReadOnlyCredential) -> Result<GraphStats> {
        let graph = self.reader(credential)?;

        Ok(GraphStats {
            total_entities: self.fetch_count(graph, STATS_ENTITY_COUNT)?,
            total_relationships: self.fetch_count(graph, STATS_RELATIONSHIP_COUNT)?,
            entity_types: self.fetch_histogram(graph, STATS_ENTITY_TYPES)?,
            relationship_types: self.fetch_histogram(graph, STATS_RELATIONSHIP_TYPES)?,
        })
    }

    fn search_entities(
        &self,
        credential: &ReadOnlyCredential,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let graph = self.reader(credential)?;

        let query = Query::new(SEARCH_ENTITIES.to_string())
            .param("pattern", pattern)
            .param("limit", limit as i64);
        let rows = self.fetch_rows(graph, query)?;

        let field = |row: &GraphRow, key: &str| {
            row.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Ok(rows
            .iter()
            .map(|row| Entity {
                name: field(row, "name"),
                entity_type: field(row, "type"),
                description: field(row, "description"),
            })
            .collect())
    }

    fn health_check(&self) -> Result<()> {
        self.ensure_open()?;
        self.fetch_rows(&self.ro, Query::new("RETURN 1 AS ok".to_string()))
            .context("Neo4j health check failed")?;
        Ok(())
    }

    /// Connections are pooled inside the driver and dropped with the store;
    /// closing only refuses further calls.
    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        info!("Neo4j store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_query_uses_vocabulary_label() {
        let query = write_relationships_query(RelationType::SubsidiaryOf);
        assert!(query.contains("[r:SUBSIDIARY_OF]"));
        assert!(query.contains("UNWIND $relationships AS rel"));
    }

    #[test]
    fn test_relationship_endpoints_merge_on_entity_identity() {
        let query = write_relationships_query(RelationType::BasedIn);
        for endpoint in ["source", "target"] {
            let merge = format!(
                "MERGE ({0}:Entity {{key: rel.{0}_key, type: rel.{0}_type}})",
                endpoint
            );
            assert!(query.contains(&merge), "missing: {}", merge);
        }
        assert!(UPSERT_ENTITIES.contains("MERGE (e:Entity {key: entity.key, type: entity.type})"));

        let params = relationship_params(&[ResolvedRelationship::new(
            extract::Relationship {
                source: "Jaguar".to_string(),
                target: "Coventry".to_string(),
                relation_type: RelationType::BasedIn,
                description: String::new(),
            },
            "ORGANIZATION",
            "UNKNOWN",
        )]);
        let BoltType::Map(map) = &params[0] else {
            panic!("expected a map");
        };
        let field = |name: &str| map.value.get(&BoltString::from(name)).cloned();
        assert_eq!(field("source_key"), Some(BoltType::from("jaguar")));
        assert_eq!(field("source_type"), Some(BoltType::from("ORGANIZATION")));
        assert_eq!(field("target_type"), Some(BoltType::from("UNKNOWN")));
    }

    #[test]
    fn test_entity_params_carry_canonical_key() {
        let params = entity_params(&[Entity {
            name: "Acme  Corp.".to_string(),
            entity_type: "ORGANIZATION".to_string(),
            description: String::new(),
        }]);
        assert_eq!(params.len(), 1);
        let BoltType::Map(map) = &params[0] else {
            panic!("expected a map");
        };
        assert_eq!(
            map.value.get(&BoltString::from("key")),
            Some(&BoltType::from("acme corp"))
        );
    }
}
