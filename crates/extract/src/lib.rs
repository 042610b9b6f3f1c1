pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod retry;
pub mod sanitize;
pub mod schema;
pub mod validate;
pub mod vocabulary;

pub use llm::{LlmCapability, OllamaClient};
pub use orchestrator::{ChunkFailure, ExtractionOrchestrator, ExtractionOutcome};
pub use retry::RetryPolicy;
pub use sanitize::{canonical_name, clean_field, sanitize, truncate};
pub use schema::{Entity, KnowledgeGraphFragment, Relationship};
pub use vocabulary::{canonicalize_relation_type, RelationType};

use ingest::{Chunk, Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::schema::RawExtraction;

/// Turns one chunk into a validated fragment
#[derive(Clone)]
pub struct Extractor {
    llm: Arc<dyn LlmCapability>,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmCapability>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    /// Extract entities and relations from a chunk of text.
    ///
    /// Transient provider errors are retried; anything else is returned to the
    /// caller, who decides how to degrade.
    pub async fn extract_chunk(&self, chunk: &Chunk) -> Result<KnowledgeGraphFragment> {
        let prompt = prompt::build_extraction_prompt(&chunk.text);

        let response = self.retry
            .run("extract_chunk", || self.llm.generate(&prompt))
            .await?;

        let fragment = parse_extraction(&response)?;
        debug!(
            chunk = chunk.index,
            entities = fragment.entities.len(),
            relationships = fragment.relationships.len(),
            "Chunk extracted"
        );
        Ok(fragment)
    }
}

/// Parse an LLM response into a fragment, dropping records that fail validation
pub fn parse_extraction(response: &str) -> Result<KnowledgeGraphFragment> {
    let payload = strip_code_fence(response);
    if payload.is_empty() {
        return Err(Error::MalformedExtraction("empty response".to_string()));
    }

    let raw: RawExtraction = serde_json::from_str(payload)
        .map_err(|e| Error::MalformedExtraction(e.to_string()))?;

    let entities = raw.entities.iter().filter_map(|r| match validate::validate_entity(r) {
        Ok(entity) => Some(entity),
        Err(e) => {
            warn!(error = %e, "Dropping entity");
            None
        }
    });
    let entities: Vec<Entity> = entities.collect();

    let relationships = raw
        .relationships
        .iter()
        .filter_map(|r| match validate::validate_relationship(r) {
            Ok(relationship) => Some(relationship),
            Err(e) => {
                warn!(error = %e, "Dropping relationship");
                None
            }
        });
    let relationships: Vec<Relationship> = relationships.collect();

    Ok(KnowledgeGraphFragment::new(entities, relationships))
}

/// Models like to wrap JSON in ```json fences
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const VALID: &str = r#"{
        "entities": [
            {"name": "OpenAI", "type": "ORGANIZATION", "description": "AI company"},
            {"name": "GPT-4", "type": "PRODUCT", "description": "Language model"},
            {"name": "", "type": "PERSON", "description": "nameless"}
        ],
        "relationships": [
            {"source": "OpenAI", "relation_type": "CREATED", "target": "GPT-4",
             "description": "developed the model"}
        ]
    }"#;

    struct FlakyLlm {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmCapability for FlakyLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(Error::TransientProvider("rate limited".to_string()))
            } else {
                Ok(VALID.to_string())
            }
        }
    }

    #[test]
    fn test_parse_valid_response() {
        let fragment = parse_extraction(VALID).unwrap();
        assert_eq!(fragment.entities.len(), 2);
        assert_eq!(fragment.relationships.len(), 1);
        assert_eq!(fragment.relationships[0].relation_type, RelationType::RelatedTo);
    }

    #[test]
    fn test_parse_fenced_response() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(parse_extraction(&fenced).unwrap().entities.len(), 2);
    }

    #[test]
    fn test_parse_failures_are_malformed() {
        assert!(matches!(parse_extraction("not json"), Err(Error::MalformedExtraction(_))));
        assert!(matches!(parse_extraction("   "), Err(Error::MalformedExtraction(_))));
        assert!(matches!(parse_extraction("[1, 2]"), Err(Error::MalformedExtraction(_))));
    }

    #[test]
    fn test_parse_missing_sections() {
        let fragment = parse_extraction("{}").unwrap();
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_extractor_retries_transient_failures() {
        let llm = Arc::new(FlakyLlm { failures: 2, calls: AtomicUsize::new(0) });
        let extractor = Extractor::new(
            llm.clone(),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        );

        let chunk = Chunk::new(0, "OpenAI created GPT-4.".to_string(), 0);
        let fragment = extractor.extract_chunk(&chunk).await.unwrap();

        assert_eq!(fragment.entities.len(), 2);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }
}
