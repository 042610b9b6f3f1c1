//! Record validation in two stages: transform (sanitize) then constrain
//! (truncate and required-field checks). A failure drops the record only.

use ingest::{Error, Result};

use crate::sanitize::{normalize_entity_type, sanitize, truncate, MAX_FIELD_LEN};
use crate::schema::{Entity, RawEntity, RawRelationship, Relationship};
use crate::vocabulary::canonicalize_relation_type;

pub fn validate_entity(raw: &RawEntity) -> Result<Entity> {
    // Stage 1: transform
    let name = sanitize(raw.name.as_deref().unwrap_or_default());
    let entity_type = normalize_entity_type(raw.entity_type.as_deref().unwrap_or_default());
    let description = sanitize(raw.description.as_deref().unwrap_or_default());

    // Stage 2: constrain
    let name = truncate(&name, MAX_FIELD_LEN);
    if name.is_empty() {
        return Err(Error::Validation("entity name is empty".to_string()));
    }
    if entity_type.is_empty() {
        return Err(Error::Validation(format!("entity '{}' has no type", name)));
    }

    Ok(Entity {
        name,
        entity_type,
        description: truncate(&description, MAX_FIELD_LEN),
    })
}

pub fn validate_relationship(raw: &RawRelationship) -> Result<Relationship> {
    // Stage 1: transform
    let source = sanitize(raw.source.as_deref().unwrap_or_default());
    let target = sanitize(raw.target.as_deref().unwrap_or_default());
    let relation_type =
        canonicalize_relation_type(raw.relation_type.as_deref().unwrap_or_default());
    let description = sanitize(raw.description.as_deref().unwrap_or_default());

    // Stage 2: constrain
    let source = truncate(&source, MAX_FIELD_LEN);
    let target = truncate(&target, MAX_FIELD_LEN);
    if source.is_empty() || target.is_empty() {
        return Err(Error::Validation(format!(
            "{} relationship is missing an endpoint",
            relation_type
        )));
    }

    Ok(Relationship {
        source,
        target,
        relation_type,
        description: truncate(&description, MAX_FIELD_LEN),
    })
}
