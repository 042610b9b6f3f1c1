use extract::RelationType;
use index::GraphRow;

/// Schema description handed to the model when it writes a traversal
pub fn graph_schema() -> String {
    let relation_types = RelationType::ALL
        .iter()
        .map(|t| format!("(:Entity)-[:{}]->(:Entity)", t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Node properties:\nEntity {{name: STRING, type: STRING, description: STRING}}\n\
         Relationship properties:\ndescription: STRING\n\
         Relationships:\n{}",
        relation_types
    )
}

pub fn build_cypher_prompt(schema: &str, question: &str) -> String {
    format!(
        r#"Task: Generate a Cypher statement to query a graph database.

INSTRUCTIONS:
- Use only the node labels, relationship types and properties in the schema
- Only read data: MATCH, OPTIONAL MATCH, WITH, UNWIND, WHERE, RETURN
- Match names case-insensitively with toLower(e.name) CONTAINS toLower('...')
- Return names, relationship types and descriptions, at most 25 rows
- Output ONLY the Cypher statement, no explanations

SCHEMA:
{}

QUESTION: {}

CYPHER:"#,
        schema, question
    )
}

/// Models often fence the statement even when told not to
pub fn extract_cypher(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("cypher")
        .or_else(|| rest.strip_prefix("sql"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// One line per row, columns in name order
pub fn format_rows(rows: &[GraphRow]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|(column, value)| match value.as_str() {
                    Some(text) => format!("{}: {}", column, text),
                    None => format!("{}: {}", column, value),
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_synthesis_prompt(
    question: &str,
    vector_context: &[String],
    graph_context: &[GraphRow],
) -> String {
    let vector_text = if vector_context.is_empty() {
        "No vector context available.".to_string()
    } else {
        vector_context
            .iter()
            .enumerate()
            .map(|(i, text)| format!("[Chunk {}] {}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    let graph_text = if graph_context.is_empty() {
        "No graph context available.".to_string()
    } else {
        format_rows(graph_context)
    };

    format!(
        r#"You are a helpful AI assistant that answers questions based on provided context.

QUESTION: {}

VECTOR CONTEXT (from similar documents):
{}

GRAPH CONTEXT (from knowledge graph):
{}

INSTRUCTIONS:
- Answer the question using only the provided context
- If the context doesn't contain relevant information, say so honestly
- Be concise and accurate
- Cite specific entities or facts when possible

ANSWER:"#,
        question, vector_text, graph_text
    )
}
