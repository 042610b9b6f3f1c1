use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sanitize::canonical_name;
use crate::vocabulary::RelationType;

/// Identity of an entity: canonical name plus type
pub type EntityKey = (String, String);

/// Identity of a relationship: canonical endpoints plus type
pub type RelationshipKey = (String, String, RelationType);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        (canonical_name(&self.name), self.entity_type.clone())
    }

    /// Whether `self` should replace `other` when both share a key.
    /// Longer description wins; ties go to the lexicographically smaller
    /// record so the outcome never depends on arrival order.
    pub fn supersedes(&self, other: &Entity) -> bool {
        let mine = self.description.chars().count();
        let theirs = other.description.chars().count();
        mine > theirs
            || (mine == theirs
                && (self.name.as_str(), self.description.as_str())
                    < (other.name.as_str(), other.description.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation_type: RelationType,
    pub description: String,
}

impl Relationship {
    pub fn key(&self) -> RelationshipKey {
        (
            canonical_name(&self.source),
            canonical_name(&self.target),
            self.relation_type,
        )
    }

    pub fn supersedes(&self, other: &Relationship) -> bool {
        let mine = self.description.chars().count();
        let theirs = other.description.chars().count();
        mine > theirs
            || (mine == theirs
                && (self.source.as_str(), self.target.as_str(), self.description.as_str())
                    < (other.source.as_str(), other.target.as_str(), other.description.as_str()))
    }
}

/// Entities and relationships extracted from one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraphFragment {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl KnowledgeGraphFragment {
    /// Build a fragment, collapsing duplicates within the chunk
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities: dedup_entities(entities),
            relationships: dedup_relationships(relationships),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Keep one entity per key, ordered by key
pub fn dedup_entities(entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
    let mut by_key: BTreeMap<EntityKey, Entity> = BTreeMap::new();
    for entity in entities {
        match by_key.get(&entity.key()) {
            Some(existing) if !entity.supersedes(existing) => {}
            _ => {
                by_key.insert(entity.key(), entity);
            }
        }
    }
    by_key.into_values().collect()
}

/// Keep one relationship per key, ordered by key
pub fn dedup_relationships(
    relationships: impl IntoIterator<Item = Relationship>,
) -> Vec<Relationship> {
    let mut by_key: BTreeMap<RelationshipKey, Relationship> = BTreeMap::new();
    for relationship in relationships {
        match by_key.get(&relationship.key()) {
            Some(existing) if !relationship.supersedes(existing) => {}
            _ => {
                by_key.insert(relationship.key(), relationship);
            }
        }
    }
    by_key.into_values().collect()
}

/// Shape the LLM is asked to produce. Every field is optional so that one
/// bad record only costs that record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default, alias = "relations")]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "entity_type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelationship {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, alias = "relation", alias = "type")]
    pub relation_type: Option<String>,
    #[serde(default, alias = "evidence")]
    pub description: Option<String>,
}
