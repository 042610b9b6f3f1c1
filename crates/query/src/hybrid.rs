use extract::sanitize::{MAX_FIELD_LEN, MAX_QUERY_LEN};
use extract::{Entity, LlmCapability, RetryPolicy, clean_field};
use index::{
    BlockingPool, GraphRow, GraphStats, GraphStore, ReadOnlyCredential, ScoredChunk, VectorStore,
};
use ingest::{Error, Result, RetrievalPath};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::prompt;
use crate::safety::CypherSafetyChecker;

pub const DEFAULT_TOP_K: usize = 5;
pub const NO_INFORMATION_ANSWER: &str =
    "I couldn't find any relevant information to answer your question.";

const MAX_ENTITY_SEARCH_LIMIT: usize = 100;

/// Columns whose string values name an entity
const ENTITY_COLUMNS: &[&str] = &["name", "source", "target", "entity"];

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunk ids (`document_id#chunk_index`) then `entity:<name>` ids
    pub sources: Vec<String>,
    /// One entry per retrieval path that failed
    pub warnings: Vec<String>,
    pub vector_context: Vec<String>,
    pub graph_context: Vec<GraphRow>,
}

/// Answers questions from the vector store and the knowledge graph.
///
/// Only ever holds a read-only graph credential.
pub struct HybridRetriever {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmCapability>,
    credential: ReadOnlyCredential,
    pool: BlockingPool,
    llm_retry: RetryPolicy,
    store_retry: RetryPolicy,
    checker: CypherSafetyChecker,
    schema: String,
    top_k: usize,
}

fn store_retry(policy: RetryPolicy) -> RetryPolicy {
    policy.with_predicate(|e| matches!(e, Error::RetrievalPath { .. }))
}

fn entity_sources(rows: &[GraphRow]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for (column, value) in row {
            // `a.name` and `name` are the same column for this purpose
            let column = column.rsplit('.').next().unwrap_or(column);
            if !(ENTITY_COLUMNS.contains(&column) || column.ends_with("_name")) {
                continue;
            }
            let Some(name) = value.as_str().filter(|n| !n.is_empty()) else {
                continue;
            };
            let id = format!("entity:{}", name);
            if !names.contains(&id) {
                names.push(id);
            }
        }
    }
    names
}

impl HybridRetriever {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        llm: Arc<dyn LlmCapability>,
        credential: ReadOnlyCredential,
        pool: BlockingPool,
    ) -> Self {
        Self {
            vectors,
            graph,
            llm,
            credential,
            pool,
            llm_retry: RetryPolicy::default(),
            store_retry: store_retry(RetryPolicy::default()),
            checker: CypherSafetyChecker::new(),
            schema: prompt::graph_schema(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = store_retry(policy.clone());
        self.llm_retry = policy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn answer(&self, query: &str, use_vector: bool, use_graph: bool) -> Result<Answer> {
        if !use_vector && !use_graph {
            return Err(Error::UsagePrecondition(
                "at least one of vector or graph search must be enabled".to_string(),
            ));
        }

        let question = clean_field(query, MAX_QUERY_LEN);
        if question.is_empty() {
            return Err(Error::UsagePrecondition("query is empty after sanitization".to_string()));
        }

        info!(use_vector, use_graph, query_len = question.len(), "Answering query");

        let (vector_result, graph_result) = tokio::join!(
            async {
                if use_vector { Some(self.vector_path(&question).await) } else { None }
            },
            async {
                if use_graph { Some(self.graph_path(&question).await) } else { None }
            },
        );

        let mut warnings = Vec::new();
        let mut enabled = 0;
        let mut hits: Vec<ScoredChunk> = Vec::new();
        let mut rows: Vec<GraphRow> = Vec::new();

        if let Some(result) = vector_result {
            enabled += 1;
            match result {
                Ok(found) => hits = found,
                Err(e) => {
                    warn!(error = %e, "Vector path failed, continuing without it");
                    warnings.push(e.to_string());
                }
            }
        }
        if let Some(result) = graph_result {
            enabled += 1;
            match result {
                Ok(found) => rows = found,
                Err(e) => {
                    warn!(error = %e, "Graph path failed, continuing without it");
                    warnings.push(e.to_string());
                }
            }
        }

        if warnings.len() == enabled {
            return Err(Error::RetrievalFailed(warnings));
        }

        let vector_context: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();

        if hits.is_empty() && rows.is_empty() {
            info!("No context found for query");
            return Ok(Answer {
                text: NO_INFORMATION_ANSWER.to_string(),
                sources: Vec::new(),
                warnings,
                vector_context,
                graph_context: rows,
            });
        }

        let synthesis_prompt = prompt::build_synthesis_prompt(&question, &vector_context, &rows);
        let text = self
            .llm_retry
            .run("synthesize_answer", || self.llm.generate(&synthesis_prompt))
            .await?;

        let mut sources: Vec<String> = hits.iter().map(ScoredChunk::source_id).collect();
        sources.extend(entity_sources(&rows));

        info!(
            chunks = hits.len(),
            graph_rows = rows.len(),
            warnings = warnings.len(),
            "Answer synthesized"
        );

        Ok(Answer {
            text: text.trim().to_string(),
            sources,
            warnings,
            vector_context,
            graph_context: rows,
        })
    }

    /// Same as [`answer`](Self::answer), but gives up with
    /// [`Error::Cancelled`] as soon as `cancel` fires
    pub async fn answer_with_cancel(
        &self,
        query: &str,
        use_vector: bool,
        use_graph: bool,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Query cancelled");
                Err(Error::Cancelled)
            }
            result = self.answer(query, use_vector, use_graph) => result,
        }
    }

    async fn vector_path(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.store_retry
            .run("vector_search", || async {
                self.vectors
                    .similarity_search(question, self.top_k)
                    .await
                    .map_err(|e| Error::retrieval(RetrievalPath::Vector, format!("{:#}", e)))
            })
            .await
    }

    async fn graph_path(&self, question: &str) -> Result<Vec<GraphRow>> {
        let cypher_prompt = prompt::build_cypher_prompt(&self.schema, question);
        let response = self
            .llm_retry
            .run("generate_cypher", || self.llm.generate(&cypher_prompt))
            .await
            .map_err(|e| {
                Error::retrieval(RetrievalPath::Graph, format!("cypher generation failed: {}", e))
            })?;

        let cypher = self
            .checker
            .check(prompt::extract_cypher(&response))
            .map_err(|e| {
                warn!(error = %e, "Rejected generated traversal");
                Error::retrieval(RetrievalPath::Graph, format!("unsafe traversal rejected: {}", e))
            })?;
        let cypher = Arc::new(cypher);

        self.store_retry
            .run("graph_traverse", || {
                let graph = self.graph.clone();
                let credential = self.credential.clone();
                let cypher = cypher.clone();
                async move {
                    self.pool
                        .run(move || graph.traverse(&credential, &cypher))
                        .await
                        .map_err(|e| Error::retrieval(RetrievalPath::Graph, format!("{:#}", e)))
                }
            })
            .await
    }

    /// Case-insensitive entity lookup by name fragment
    pub async fn search_entities(&self, pattern: &str, limit: usize) -> Result<Vec<Entity>> {
        let pattern = clean_field(pattern, MAX_FIELD_LEN);
        let limit = limit.clamp(1, MAX_ENTITY_SEARCH_LIMIT);

        let graph = self.graph.clone();
        let credential = self.credential.clone();
        self.pool
            .run(move || graph.search_entities(&credential, &pattern, limit))
            .await
            .map_err(|e| Error::retrieval(RetrievalPath::Graph, format!("{:#}", e)))
    }

    pub async fn graph_stats(&self) -> Result<GraphStats> {
        let graph = self.graph.clone();
        let credential = self.credential.clone();
        self.pool
            .run(move || graph.stats(&credential))
            .await
            .map_err(|e| Error::retrieval(RetrievalPath::Graph, format!("{:#}", e)))
    }
}
