use crate::vocabulary::RelationType;

pub fn build_extraction_prompt(chunk_text: &str) -> String {
    let relation_types = RelationType::ALL
        .iter()
        .map(RelationType::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Extract entities and relationships from the following text.

INSTRUCTIONS:
1. Identify key entities (people, organizations, locations, concepts, products, events)
2. Extract relationships between entities
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "entities": [
    {{"name": "EntityName",
      "type": "PERSON|ORGANIZATION|LOCATION|CONCEPT|PRODUCT|EVENT",
      "description": "brief description"}}
  ],
  "relationships": [
    {{"source": "EntityName",
      "relation_type": "RELATION_TYPE",
      "target": "OtherEntityName",
      "description": "brief description"}}
  ]
}}

RULES:
- Relationship source and target must repeat an entity name exactly
- Relation types must be one of: {}
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{}

JSON OUTPUT:"#,
        relation_types, chunk_text
    )
}
