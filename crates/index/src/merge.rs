use extract::schema::{dedup_entities, dedup_relationships};
use extract::{Entity, KnowledgeGraphFragment, RelationType, Relationship, canonical_name};
use std::collections::BTreeMap;

use crate::store::{ResolvedRelationship, UNKNOWN_ENTITY_TYPE};

/// Deduplicated union of every fragment extracted from one document.
///
/// Fragments can arrive in any order; the result does not depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl DocumentGraph {
    pub fn merge(fragments: impl IntoIterator<Item = KnowledgeGraphFragment>) -> Self {
        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        for fragment in fragments {
            entities.extend(fragment.entities);
            relationships.extend(fragment.relationships);
        }

        Self {
            entities: dedup_entities(entities),
            relationships: dedup_relationships(relationships),
        }
    }

    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }

    /// Relationships grouped for one write per type, with each endpoint
    /// resolved to the type it was extracted under in this document.
    ///
    /// A name extracted under several types resolves to the smallest one.
    /// A name never extracted as an entity resolves to the placeholder type.
    pub fn relationships_by_type(&self) -> BTreeMap<RelationType, Vec<ResolvedRelationship>> {
        let mut types: BTreeMap<String, &str> = BTreeMap::new();
        for entity in &self.entities {
            types
                .entry(canonical_name(&entity.name))
                .and_modify(|current| *current = (*current).min(entity.entity_type.as_str()))
                .or_insert(entity.entity_type.as_str());
        }
        let type_of = |name: &str| {
            types
                .get(&canonical_name(name))
                .copied()
                .unwrap_or(UNKNOWN_ENTITY_TYPE)
        };

        let mut grouped: BTreeMap<RelationType, Vec<ResolvedRelationship>> = BTreeMap::new();
        for relationship in &self.relationships {
            let resolved = ResolvedRelationship::new(
                relationship.clone(),
                type_of(&relationship.source),
                type_of(&relationship.target),
            );
            grouped.entry(relationship.relation_type).or_default().push(resolved);
        }
        grouped
    }
}
